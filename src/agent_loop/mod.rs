//! Agent loop: round-bounded tool calling over a model backend.

pub mod executor;
pub mod tool_loop;

pub use executor::{invoke_tool, TOOL_ERROR_PREFIX};
pub use tool_loop::{stream_with_tools, ToolLoopRequest, DEFAULT_MAX_TOOL_ROUNDS};
