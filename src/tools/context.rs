//! Context-retrieval tool over the caller's other conversations.

use std::sync::Arc;

use async_trait::async_trait;

use super::arguments::ToolArguments;
use super::tool::Tool;
use super::types::ToolParameters;
use crate::error::ParleyError;
use crate::store::ConversationStore;

pub const CONTEXT_TOOL_NAME: &str = "retrieve_context";

const DEFAULT_LIMIT: usize = 5;
const SNIPPET_CHARS: usize = 280;

/// Searches earlier conversations owned by one user for matching messages.
pub struct ContextRetrievalTool {
    store: Arc<dyn ConversationStore>,
    user_id: String,
    exclude_conversation: Option<String>,
    limit: usize,
    parameters: ToolParameters,
}

impl ContextRetrievalTool {
    pub fn new(store: Arc<dyn ConversationStore>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
            exclude_conversation: None,
            limit: DEFAULT_LIMIT,
            parameters: ToolParameters::object()
                .string("query", "Words to look for in earlier conversations", true)
                .integer("limit", "Maximum number of snippets to return", false)
                .build(),
        }
    }

    /// Skip the conversation the stream is running in.
    pub fn excluding(mut self, conversation_id: impl Into<String>) -> Self {
        self.exclude_conversation = Some(conversation_id.into());
        self
    }
}

#[async_trait]
impl Tool for ContextRetrievalTool {
    fn name(&self) -> &str {
        CONTEXT_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Retrieve relevant snippets from the user's earlier conversations."
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn invoke(&self, args: &ToolArguments) -> Result<String, ParleyError> {
        let query = args.get_str("query")?.trim().to_lowercase();
        if query.is_empty() {
            return Err(ParleyError::InvalidArgument("query must not be empty".into()));
        }
        let limit = args
            .get_i64_opt("limit")
            .and_then(|l| usize::try_from(l).ok())
            .filter(|l| *l > 0)
            .unwrap_or(self.limit);
        let terms: Vec<&str> = query.split_whitespace().collect();

        let mut snippets = Vec::new();
        'outer: for conversation in self.store.conversations_for_user(&self.user_id).await? {
            if self.exclude_conversation.as_deref() == Some(conversation.id.as_str()) {
                continue;
            }
            for message in self.store.get_messages(&conversation.id).await? {
                let text = message.text_content();
                let haystack = text.to_lowercase();
                if terms.iter().any(|term| haystack.contains(term)) {
                    let snippet: String = text.chars().take(SNIPPET_CHARS).collect();
                    snippets.push(format!("[{}] {}", conversation.id, snippet));
                    if snippets.len() >= limit {
                        break 'outer;
                    }
                }
            }
        }

        tracing::debug!(
            user_id = %self.user_id,
            matches = snippets.len(),
            "context retrieval finished"
        );

        if snippets.is_empty() {
            Ok("No matching context found.".to_string())
        } else {
            Ok(snippets.join("\n"))
        }
    }
}
