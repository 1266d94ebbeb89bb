//! Chat stream protocol: events, stream requests and control calls.

pub mod events;
pub mod request;

pub use events::*;
pub use request::*;
