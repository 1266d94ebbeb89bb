//! Convenience re-exports for common use.

pub use crate::agent_loop::{stream_with_tools, ToolLoopRequest};
pub use crate::client::{ChatTransport, ConsumerState, HttpTransport, StreamConsumer};
pub use crate::config::{ParleyConfig, StreamSettings};
pub use crate::error::{ParleyError, Result};
pub use crate::orchestrator::ChatStreamUseCase;
pub use crate::protocol::{ChatStreamRequest, ControlAck, ControlRequest, EventKind, ProtocolEvent};
pub use crate::provider::{create_backend, ModelBackend, ModelRequest, ModelSpec};
pub use crate::session::{InMemorySessionRegistry, SessionRegistry};
pub use crate::store::{AgentStore, ConversationStore, MemoryStore};
pub use crate::tools::{FnTool, Tool, ToolArguments, ToolParameters, ToolSet};
pub use crate::types::{GenerationSettings, LlmStreamEvent, Message, ModelChunk, ModelMessage};
