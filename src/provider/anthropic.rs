//! Anthropic Messages API backend.

use async_trait::async_trait;
use futures::StreamExt;
use tracing::debug;

use crate::error::ParleyError;
use crate::types::{ModelChunk, ModelRole, ToolCallFragment};
use crate::util::retry::RetryPolicy;

use super::http::{anthropic_headers, open_stream, parse_tool_args, sse_frames};
use super::{ChunkStream, ModelBackend, ModelRequest};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicBackend {
    model: String,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl AnthropicBackend {
    pub fn new(model: impl Into<String>, api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn build_request_body(&self, request: &ModelRequest) -> serde_json::Value {
        let mut system_parts = Vec::new();
        let mut messages: Vec<serde_json::Value> = Vec::new();
        // Consecutive tool results travel in one user turn.
        let mut tool_results: Vec<serde_json::Value> = Vec::new();

        for msg in &request.messages {
            if msg.role != ModelRole::Tool && !tool_results.is_empty() {
                messages.push(serde_json::json!({
                    "role": "user",
                    "content": std::mem::take(&mut tool_results),
                }));
            }
            match msg.role {
                ModelRole::System => system_parts.push(msg.content.clone()),
                ModelRole::Human => messages.push(serde_json::json!({
                    "role": "user",
                    "content": msg.content,
                })),
                ModelRole::Ai => {
                    let mut content: Vec<serde_json::Value> = Vec::new();
                    if !msg.content.is_empty() {
                        content.push(serde_json::json!({"type": "text", "text": msg.content}));
                    }
                    for tc in &msg.tool_calls {
                        content.push(serde_json::json!({
                            "type": "tool_use",
                            "id": tc.id,
                            "name": tc.name,
                            "input": tc.args,
                        }));
                    }
                    if !content.is_empty() {
                        messages.push(serde_json::json!({
                            "role": "assistant",
                            "content": content,
                        }));
                    }
                }
                ModelRole::Tool => tool_results.push(serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id,
                    "content": msg.content,
                    "is_error": msg.content.starts_with("Error: "),
                })),
            }
        }
        if !tool_results.is_empty() {
            messages.push(serde_json::json!({
                "role": "user",
                "content": tool_results,
            }));
        }

        let mut body = serde_json::Map::new();
        body.insert("model".into(), self.model.clone().into());
        body.insert("messages".into(), messages.into());
        body.insert(
            "max_tokens".into(),
            request.settings.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS).into(),
        );
        body.insert("stream".into(), true.into());
        if !system_parts.is_empty() {
            body.insert("system".into(), system_parts.join("\n").into());
        }
        if let Some(temp) = request.settings.temperature {
            body.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = request.settings.top_p {
            body.insert("top_p".into(), top_p.into());
        }
        if let Some(ref tools) = request.tools {
            if !tools.is_empty() {
                let tool_defs: Vec<serde_json::Value> = tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "name": t.name,
                            "description": t.description,
                            "input_schema": t.parameters,
                        })
                    })
                    .collect();
                body.insert("tools".into(), tool_defs.into());
            }
        }

        serde_json::Value::Object(body)
    }
}

#[async_trait]
impl ModelBackend for AnthropicBackend {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn stream_chunks(&self, request: &ModelRequest) -> Result<ChunkStream, ParleyError> {
        let body = self.build_request_body(request);
        let url = format!("{}/messages", self.base_url);

        debug!(model = %self.model, tools = request.has_tools(), "Anthropic stream_chunks");

        let headers = anthropic_headers(&self.api_key, API_VERSION);
        let resp = open_stream(&url, headers, &body, &self.retry).await?;
        let mut frames = sse_frames(resp);

        let stream = async_stream::stream! {
            let mut current_tool: Option<(String, String)> = None;
            let mut current_tool_input = String::new();

            while let Some(frame) = frames.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                if frame.data.trim().is_empty() {
                    continue;
                }
                let event: serde_json::Value = match serde_json::from_str(&frame.data) {
                    Ok(event) => event,
                    Err(e) => {
                        debug!(error = %e, "skipping unparseable Anthropic event");
                        continue;
                    }
                };
                let event_type = event
                    .get("type")
                    .and_then(|t| t.as_str())
                    .or(frame.event.as_deref())
                    .unwrap_or("");

                match event_type {
                    "content_block_start" => {
                        let block = event.get("content_block");
                        let block_type = block.and_then(|b| b.get("type")).and_then(|t| t.as_str());
                        if block_type == Some("tool_use") {
                            let field = |name: &str| {
                                block
                                    .and_then(|b| b.get(name))
                                    .and_then(|v| v.as_str())
                                    .unwrap_or_default()
                                    .to_string()
                            };
                            current_tool = Some((field("id"), field("name")));
                            current_tool_input.clear();
                        }
                    }
                    "content_block_delta" => {
                        let delta = event.get("delta");
                        match delta.and_then(|d| d.get("type")).and_then(|t| t.as_str()) {
                            Some("text_delta") => {
                                if let Some(text) = delta.and_then(|d| d.get("text")).and_then(|t| t.as_str()) {
                                    if !text.is_empty() {
                                        yield Ok(ModelChunk::text(text));
                                    }
                                }
                            }
                            Some("input_json_delta") => {
                                if let Some(json) = delta.and_then(|d| d.get("partial_json")).and_then(|t| t.as_str()) {
                                    current_tool_input.push_str(json);
                                }
                            }
                            _ => {}
                        }
                    }
                    "content_block_stop" => {
                        if let Some((id, name)) = current_tool.take() {
                            let args = parse_tool_args(&current_tool_input);
                            current_tool_input.clear();
                            yield Ok(ModelChunk::tool_calls(vec![ToolCallFragment::new(id, name, args)]));
                        }
                    }
                    "message_stop" => break,
                    "error" => {
                        let message = event
                            .get("error")
                            .and_then(|e| e.get("message"))
                            .and_then(|m| m.as_str())
                            .unwrap_or("unknown stream error")
                            .to_string();
                        yield Err(ParleyError::Stream(message));
                        return;
                    }
                    _ => {}
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ModelMessage, ToolCall};

    #[test]
    fn system_turns_move_to_top_level() {
        let backend = AnthropicBackend::new("claude-3-5-haiku-latest", "k", None);
        let body = backend.build_request_body(&ModelRequest::new(vec![
            ModelMessage::system("be brief"),
            ModelMessage::human("hi"),
        ]));
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
    }

    #[test]
    fn consecutive_tool_results_share_one_user_turn() {
        let calls = vec![
            ToolCall {
                id: "t1".into(),
                name: "a".into(),
                args: serde_json::Map::new(),
            },
            ToolCall {
                id: "t2".into(),
                name: "b".into(),
                args: serde_json::Map::new(),
            },
        ];
        let backend = AnthropicBackend::new("claude", "k", None);
        let body = backend.build_request_body(&ModelRequest::new(vec![
            ModelMessage::human("go"),
            ModelMessage::ai_with_tool_calls("", calls),
            ModelMessage::tool_result("t1", "one"),
            ModelMessage::tool_result("t2", "Error: boom"),
        ]));
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][0]["type"], "tool_use");
        let results = messages[2]["content"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1]["is_error"], true);
    }
}
