//! OpenAI Chat Completions backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tracing::debug;

use crate::error::ParleyError;
use crate::types::{ModelChunk, ModelMessage, ModelRole, ToolCallFragment};
use crate::util::retry::RetryPolicy;

use super::http::{bearer_headers, open_stream, parse_tool_args, sse_frames};
use super::{ChunkStream, ModelBackend, ModelRequest};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiBackend {
    model: String,
    api_key: String,
    base_url: String,
    retry: RetryPolicy,
}

impl OpenAiBackend {
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
        let messages: Vec<serde_json::Value> =
            request.messages.iter().map(message_to_openai).collect();

        let mut body = serde_json::Map::new();
        body.insert("model".into(), self.model.clone().into());
        body.insert("messages".into(), messages.into());
        body.insert("stream".into(), true.into());

        if let Some(max) = request.settings.max_tokens {
            body.insert("max_tokens".into(), max.into());
        }
        if let Some(temp) = request.settings.temperature {
            body.insert("temperature".into(), temp.into());
        }
        if let Some(top_p) = request.settings.top_p {
            body.insert("top_p".into(), top_p.into());
        }
        if let Some(ref user) = request.settings.user {
            body.insert("user".into(), user.clone().into());
        }

        if let Some(ref tools) = request.tools {
            if !tools.is_empty() {
                let tool_defs: Vec<serde_json::Value> = tools
                    .iter()
                    .map(|t| {
                        serde_json::json!({
                            "type": "function",
                            "function": {
                                "name": t.name,
                                "description": t.description,
                                "parameters": t.parameters,
                            }
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
impl ModelBackend for OpenAiBackend {
    fn name(&self) -> &str {
        "openai"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn stream_chunks(&self, request: &ModelRequest) -> Result<ChunkStream, ParleyError> {
        let body = self.build_request_body(request);
        let url = format!("{}/chat/completions", self.base_url);

        debug!(model = %self.model, tools = request.has_tools(), "OpenAI stream_chunks");

        let resp = open_stream(&url, bearer_headers(&self.api_key), &body, &self.retry).await?;
        let mut frames = sse_frames(resp);

        let stream = async_stream::stream! {
            let mut pending = PendingToolCalls::default();

            while let Some(frame) = frames.next().await {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                let data = frame.data.trim();
                if data.is_empty() {
                    continue;
                }
                if data == "[DONE]" {
                    break;
                }

                let chunk: OpenAiStreamChunk = match serde_json::from_str(data) {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        debug!(error = %e, "skipping unparseable OpenAI chunk");
                        continue;
                    }
                };
                if let Some(err) = chunk.error {
                    yield Err(ParleyError::Stream(err.message));
                    return;
                }

                for choice in chunk.choices {
                    if let Some(text) = choice.delta.content.filter(|t| !t.is_empty()) {
                        yield Ok(ModelChunk::text(text));
                    }
                    for piece in choice.delta.tool_calls.unwrap_or_default() {
                        pending.absorb(piece);
                    }
                    if choice.finish_reason.is_some() && !pending.is_empty() {
                        yield Ok(ModelChunk::tool_calls(pending.drain()));
                    }
                }
            }

            if !pending.is_empty() {
                yield Ok(ModelChunk::tool_calls(pending.drain()));
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Tool-call pieces buffered by their `index` until the choice finishes.
///
/// OpenAI sends the id and name once, then the argument JSON as string
/// pieces that only parse once concatenated.
#[derive(Default)]
struct PendingToolCalls {
    calls: BTreeMap<usize, PendingCall>,
}

#[derive(Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

impl PendingToolCalls {
    fn absorb(&mut self, piece: OpenAiToolCallDelta) {
        let entry = self.calls.entry(piece.index).or_default();
        if let Some(id) = piece.id.filter(|id| !id.is_empty()) {
            entry.id = id;
        }
        if let Some(function) = piece.function {
            if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                entry.name = name;
            }
            if let Some(arguments) = function.arguments {
                entry.arguments.push_str(&arguments);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    fn drain(&mut self) -> Vec<ToolCallFragment> {
        std::mem::take(&mut self.calls)
            .into_iter()
            .map(|(index, call)| {
                let id = if call.id.is_empty() {
                    format!("call_{index}")
                } else {
                    call.id
                };
                ToolCallFragment::new(id, call.name, parse_tool_args(&call.arguments))
            })
            .collect()
    }
}

fn message_to_openai(msg: &ModelMessage) -> serde_json::Value {
    match msg.role {
        ModelRole::System => serde_json::json!({ "role": "system", "content": msg.content }),
        ModelRole::Human => serde_json::json!({ "role": "user", "content": msg.content }),
        ModelRole::Tool => serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.tool_call_id,
            "content": msg.content,
        }),
        ModelRole::Ai if msg.tool_calls.is_empty() => {
            serde_json::json!({ "role": "assistant", "content": msg.content })
        }
        ModelRole::Ai => {
            let tool_calls: Vec<serde_json::Value> = msg
                .tool_calls
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.id,
                        "type": "function",
                        "function": {
                            "name": tc.name,
                            "arguments": serde_json::Value::Object(tc.args.clone()).to_string(),
                        }
                    })
                })
                .collect();
            let content = if msg.content.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::Value::String(msg.content.clone())
            };
            serde_json::json!({
                "role": "assistant",
                "content": content,
                "tool_calls": tool_calls,
            })
        }
    }
}

// OpenAI API stream types (internal)

#[derive(Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    error: Option<OpenAiStreamError>,
}

#[derive(Deserialize)]
struct OpenAiStreamError {
    message: String,
}

#[derive(Deserialize)]
struct OpenAiStreamChoice {
    delta: OpenAiStreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCallDelta>>,
}

#[derive(Deserialize)]
struct OpenAiToolCallDelta {
    #[serde(default)]
    index: usize,
    id: Option<String>,
    function: Option<OpenAiFunctionDelta>,
}

#[derive(Deserialize)]
struct OpenAiFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}
