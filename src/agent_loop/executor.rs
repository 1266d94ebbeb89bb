//! Tool invocation with failures folded into results.

use std::sync::Arc;

use crate::error::ParleyError;
use crate::tools::{Tool, ToolArguments};
use crate::types::ToolCall;

/// Prefix of every failed tool result.
pub const TOOL_ERROR_PREFIX: &str = "Error: ";

/// Invoke `tool` for `call`, never propagating a failure.
///
/// A failed invocation becomes the result text `Error: <message>`.
pub async fn invoke_tool(tool: &Arc<dyn Tool>, call: &ToolCall) -> String {
    let args = ToolArguments::new(call.args.clone());
    match tool.invoke(&args).await {
        Ok(result) => result,
        Err(err) => {
            tracing::warn!(
                tool = %call.name,
                call_id = %call.id,
                error = %err,
                "tool invocation failed"
            );
            format!("{TOOL_ERROR_PREFIX}{}", failure_message(&err))
        }
    }
}

/// Result text recorded for a call that named no known tool.
pub fn unknown_tool_result(name: &str) -> String {
    format!("{TOOL_ERROR_PREFIX}unknown tool '{name}'")
}

fn failure_message(err: &ParleyError) -> String {
    match err {
        ParleyError::ToolInvocation { message, .. } => message.clone(),
        ParleyError::InvalidArgument(message) => message.clone(),
        other => other.to_string(),
    }
}
