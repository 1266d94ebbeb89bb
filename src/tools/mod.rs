//! Tool system for function calling.

pub mod arguments;
pub mod context;
pub mod registry;
pub mod tool;
pub mod types;

pub use arguments::ToolArguments;
pub use context::{ContextRetrievalTool, CONTEXT_TOOL_NAME};
pub use registry::ToolSet;
pub use tool::{FnTool, Tool};
pub use types::{ToolDefinition, ToolParameters};
