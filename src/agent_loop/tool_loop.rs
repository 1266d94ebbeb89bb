//! Round-bounded model/tool loop.
//!
//! Each round streams one model response over the running message list,
//! merges tool-call fragments by id and runs the requested tools. The loop
//! ends when a response requests no tools, when no requested tool produced
//! a result, or after `max_tool_rounds` tool-bound calls, in which case one
//! last call is made without tools.

use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::executor::{invoke_tool, unknown_tool_result};
use crate::error::ParleyError;
use crate::provider::{ModelBackend, ModelRequest};
use crate::tools::ToolSet;
use crate::types::{GenerationSettings, LlmStreamEvent, ModelMessage, ToolCallAccumulator};

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 3;

/// Input of [`stream_with_tools`].
#[derive(Debug, Clone)]
pub struct ToolLoopRequest {
    pub messages: Vec<ModelMessage>,
    pub tools: ToolSet,
    pub max_tool_rounds: usize,
    pub settings: GenerationSettings,
    /// Checked before every model call and every tool invocation. Once
    /// cancelled the stream ends without `done`.
    pub cancel: Option<CancellationToken>,
}

impl ToolLoopRequest {
    pub fn new(messages: Vec<ModelMessage>, tools: ToolSet) -> Self {
        Self {
            messages,
            tools,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            settings: GenerationSettings::default(),
            cancel: None,
        }
    }

    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds;
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Drive `backend` through the tool loop.
///
/// Yields `token` per text chunk, `tool_start`/`tool_end` around each
/// resolved tool call, and finally `done` with the full message list. Tool
/// failures are folded into `Error: ...` results; backend errors end the
/// stream with `Err`.
pub fn stream_with_tools(
    backend: Arc<dyn ModelBackend>,
    request: ToolLoopRequest,
) -> BoxStream<'static, Result<LlmStreamEvent, ParleyError>> {
    let ToolLoopRequest {
        messages,
        tools,
        max_tool_rounds,
        settings,
        cancel,
    } = request;

    let stream = async_stream::stream! {
        let is_cancelled = || cancel.as_ref().is_some_and(|c| c.is_cancelled());
        let mut messages = messages;
        let definitions = tools.definitions();

        for round in 0..max_tool_rounds {
            if is_cancelled() {
                tracing::debug!(round, "tool loop cancelled before model call");
                return;
            }

            let mut model_request = ModelRequest::new(messages.clone()).with_settings(settings.clone());
            if !definitions.is_empty() {
                model_request = model_request.with_tools(definitions.clone());
            }

            let mut chunks = match backend.stream_chunks(&model_request).await {
                Ok(chunks) => chunks,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let mut text = String::new();
            let mut accumulator = ToolCallAccumulator::new();
            while let Some(chunk) = chunks.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };
                if let Some(piece) = chunk.text.filter(|t| !t.is_empty()) {
                    text.push_str(&piece);
                    yield Ok(LlmStreamEvent::Token { text: piece });
                }
                for fragment in chunk.tool_call_fragments {
                    accumulator.push(fragment);
                }
            }

            let calls = accumulator.into_calls();
            tracing::debug!(
                round,
                backend = backend.name(),
                text_len = text.len(),
                tool_calls = calls.len(),
                "model round finished"
            );
            messages.push(ModelMessage::ai_with_tool_calls(text, calls.clone()));

            if calls.is_empty() {
                yield Ok(LlmStreamEvent::Done { messages });
                return;
            }

            let mut results = Vec::with_capacity(calls.len());
            let mut produced_result = false;
            for call in &calls {
                if is_cancelled() {
                    tracing::debug!(round, tool = %call.name, "tool loop cancelled before tool call");
                    return;
                }
                yield Ok(LlmStreamEvent::ToolStart {
                    name: call.name.clone(),
                    call_id: call.id.clone(),
                });
                let Some(tool) = tools.get(&call.name) else {
                    tracing::warn!(round, tool = %call.name, call_id = %call.id, "model requested unknown tool");
                    results.push(ModelMessage::tool_result(&call.id, unknown_tool_result(&call.name)));
                    continue;
                };
                let result = invoke_tool(tool, call).await;
                produced_result = true;
                yield Ok(LlmStreamEvent::ToolEnd {
                    name: call.name.clone(),
                    call_id: call.id.clone(),
                    result: result.clone(),
                });
                results.push(ModelMessage::tool_result(&call.id, result));
            }

            if !produced_result {
                // Nothing resolved; another round would ask for the same tools.
                yield Ok(LlmStreamEvent::Done { messages });
                return;
            }
            messages.extend(results);
        }

        if is_cancelled() {
            return;
        }
        tracing::debug!(max_tool_rounds, "tool rounds exhausted; final call without tools");

        let final_request = ModelRequest::new(messages.clone()).with_settings(settings.clone());
        let mut chunks = match backend.stream_chunks(&final_request).await {
            Ok(chunks) => chunks,
            Err(e) => {
                yield Err(e);
                return;
            }
        };
        let mut text = String::new();
        let mut discarded = 0usize;
        while let Some(chunk) = chunks.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            if let Some(piece) = chunk.text.filter(|t| !t.is_empty()) {
                text.push_str(&piece);
                yield Ok(LlmStreamEvent::Token { text: piece });
            }
            discarded += chunk.tool_call_fragments.len();
        }
        if discarded > 0 {
            tracing::warn!(discarded, "ignoring tool calls requested after the final round");
        }
        messages.push(ModelMessage::ai(text));
        yield Ok(LlmStreamEvent::Done { messages });
    };

    Box::pin(stream)
}
