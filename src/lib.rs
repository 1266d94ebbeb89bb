//! Parley: a streaming agent chat pipeline.
//!
//! One user message goes in; an ordered, interruptible stream of protocol
//! events comes out, while the model is driven through a bounded number of
//! tool-calling rounds and the conversation is persisted.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use parley::prelude::*;
//!
//! # async fn example() -> parley::error::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let backend = create_backend(&"echo:parrot".parse()?, &ParleyConfig::new())?;
//! let chat = ChatStreamUseCase::new(
//!     store.clone(),
//!     store,
//!     backend,
//!     Arc::new(InMemorySessionRegistry::new()),
//! );
//!
//! let mut events = chat.execute("u1", ChatStreamRequest::new("c1", "Hello"));
//! while let Some(event) = events.next().await {
//!     println!("{}", parley::wire::encode_event(&event)?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent_loop;
pub mod client;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod prelude;
pub mod protocol;
pub mod provider;
pub mod session;
pub mod store;
pub mod tools;
pub mod types;
pub mod util;
pub mod wire;

#[cfg(feature = "server")]
pub mod server;

#[cfg(feature = "cli")]
pub mod cli;
