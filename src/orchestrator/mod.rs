//! Stream orchestrator: one user message in, an ordered event stream out.

pub mod chunking;

pub use chunking::chunk_reply;

use std::sync::Arc;
use std::time::Instant;

use futures::stream::BoxStream;
use futures::StreamExt;
use uuid::Uuid;

use crate::agent_loop::{stream_with_tools, ToolLoopRequest};
use crate::config::StreamSettings;
use crate::error::{ParleyError, Result};
use crate::protocol::{ChatStreamRequest, EventFactory, ProtocolEvent, ThinkingReason};
use crate::provider::ModelBackend;
use crate::session::{SessionGuard, SessionRegistry};
use crate::store::{AgentStore, ConversationStore};
use crate::tools::{ContextRetrievalTool, ToolSet};
use crate::types::{
    Agent, Conversation, GenerationSettings, LlmStreamEvent, Message, MessageRole, ModelMessage,
    ModelRole,
};

/// The chat streaming use case.
///
/// Cheap to clone; every collaborator is shared.
#[derive(Clone)]
pub struct ChatStreamUseCase {
    conversations: Arc<dyn ConversationStore>,
    agents: Arc<dyn AgentStore>,
    backend: Arc<dyn ModelBackend>,
    sessions: Arc<dyn SessionRegistry>,
    catalog: ToolSet,
    settings: StreamSettings,
    generation: GenerationSettings,
}

impl ChatStreamUseCase {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        agents: Arc<dyn AgentStore>,
        backend: Arc<dyn ModelBackend>,
        sessions: Arc<dyn SessionRegistry>,
    ) -> Self {
        Self {
            conversations,
            agents,
            backend,
            sessions,
            catalog: ToolSet::new(),
            settings: StreamSettings::default(),
            generation: GenerationSettings::default(),
        }
    }

    /// Tools agents may bind by name.
    pub fn with_catalog(mut self, catalog: ToolSet) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_settings(mut self, settings: StreamSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_generation(mut self, generation: GenerationSettings) -> Self {
        self.generation = generation;
        self
    }

    pub fn sessions(&self) -> &Arc<dyn SessionRegistry> {
        &self.sessions
    }

    /// Request an interrupt of the conversation's in-flight stream.
    ///
    /// Returns `false` when there is no interruptible stream.
    pub fn interrupt(&self, conversation_id: &str) -> bool {
        let found = self.sessions.interrupt(conversation_id);
        tracing::debug!(conversation_id, found, "interrupt requested");
        found
    }

    /// Run one chat turn as a lazy event stream.
    ///
    /// The stream is finite and ends right after its terminal event
    /// (`chat.completed`, `chat.failed` or `chat.interrupted`). Dropping it
    /// early releases the conversation's session.
    pub fn execute(
        &self,
        user_id: impl Into<String>,
        request: ChatStreamRequest,
    ) -> BoxStream<'static, ProtocolEvent> {
        let this = self.clone();
        let user_id = user_id.into();

        let stream = async_stream::stream! {
            let started_at = Instant::now();
            let message_id = Uuid::new_v4().to_string();
            let conversation_id = request.conversation_id.clone();
            let events = EventFactory::new(&conversation_id, &message_id);

            tracing::debug!(%conversation_id, %message_id, %user_id, "chat stream start");

            let (conversation, agent) = match this.authorize(&user_id, &request).await {
                Ok(found) => found,
                Err(err) => {
                    yield this.failure(&events, &conversation_id, &message_id, err);
                    return;
                }
            };
            let guard = SessionGuard::register(this.sessions.clone(), &conversation_id, &message_id);

            yield events.started();

            let user_message = Message::text(&conversation.id, MessageRole::User, request.message.text());
            let user_message = match this.conversations.save_message(user_message).await {
                Ok(saved) => saved,
                Err(err) => {
                    yield this.failure(&events, &conversation_id, &message_id, err);
                    return;
                }
            };

            yield events.thinking(ThinkingReason::RetrievingContext);
            if guard.is_aborted() {
                yield this.interrupted(&events, &conversation_id, &message_id);
                return;
            }

            let stored = match this.conversations.get_messages(&conversation.id).await {
                Ok(stored) => stored,
                Err(err) => {
                    yield this.failure(&events, &conversation_id, &message_id, err);
                    return;
                }
            };
            let mut model_messages = vec![ModelMessage::system(agent.system_prompt())];
            model_messages.extend(
                stored
                    .iter()
                    .filter(|m| m.id != user_message.id)
                    .filter_map(ModelMessage::from_stored),
            );
            model_messages.push(ModelMessage::human(user_message.text_content()));

            let tools = this.bind_tools(&agent, &user_id, &conversation.id);
            tracing::debug!(
                %conversation_id,
                %message_id,
                history = model_messages.len(),
                tools = tools.len(),
                "planning"
            );
            yield events.thinking(ThinkingReason::Planning);
            if guard.is_aborted() {
                yield this.interrupted(&events, &conversation_id, &message_id);
                return;
            }

            let input_len = model_messages.len();
            let loop_request = ToolLoopRequest::new(model_messages, tools)
                .with_max_tool_rounds(this.settings.max_tool_rounds)
                .with_settings(this.generation.clone())
                .with_cancel(guard.token());
            let mut llm_events = stream_with_tools(this.backend.clone(), loop_request);

            let mut final_messages = None;
            while let Some(event) = llm_events.next().await {
                match event {
                    Ok(LlmStreamEvent::Done { messages }) => final_messages = Some(messages),
                    Ok(LlmStreamEvent::ToolStart { name, call_id }) => {
                        tracing::debug!(%conversation_id, tool = %name, %call_id, "tool start");
                    }
                    Ok(LlmStreamEvent::ToolEnd { name, call_id, .. }) => {
                        tracing::debug!(%conversation_id, tool = %name, %call_id, "tool end");
                    }
                    Ok(LlmStreamEvent::Token { .. }) => {}
                    Err(err) => {
                        yield this.failure(&events, &conversation_id, &message_id, err);
                        return;
                    }
                }
            }
            if guard.is_aborted() {
                yield this.interrupted(&events, &conversation_id, &message_id);
                return;
            }
            let Some(final_messages) = final_messages else {
                let err = ParleyError::Stream("model stream ended without a result".into());
                yield this.failure(&events, &conversation_id, &message_id, err);
                return;
            };

            let produced = final_messages.get(input_len..).unwrap_or_default();
            let tool_rounds = produced.iter().filter(|m| m.role == ModelRole::Ai).count();
            let reply = produced
                .iter()
                .rev()
                .find(|m| m.role == ModelRole::Ai && !m.content.is_empty())
                .map(|m| m.content.clone())
                .unwrap_or_default();

            for chunk in chunk_reply(&reply, this.settings.delta_chunk_chars) {
                if guard.is_aborted() {
                    yield this.interrupted(&events, &conversation_id, &message_id);
                    return;
                }
                yield events.delta(chunk);
            }

            let latency_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
            let assistant = Message::text(&conversation.id, MessageRole::Assistant, reply)
                .with_id(&message_id)
                .with_metadata("latency_ms", latency_ms)
                .with_metadata("tool_rounds", tool_rounds)
                .with_metadata("model", this.backend.model_id());
            let assistant = match this.conversations.save_message(assistant).await {
                Ok(saved) => saved,
                Err(err) => {
                    yield this.failure(&events, &conversation_id, &message_id, err);
                    return;
                }
            };

            yield events.message_completed(assistant);
            yield events.completed();
            tracing::info!(%conversation_id, %message_id, latency_ms, tool_rounds, "chat stream completed");
            drop(guard);
        };

        Box::pin(stream)
    }

    /// Resolve the conversation and agent and check the caller may use them.
    async fn authorize(
        &self,
        user_id: &str,
        request: &ChatStreamRequest,
    ) -> Result<(Conversation, Agent)> {
        request.validate()?;
        let conversation = self
            .conversations
            .get_conversation(&request.conversation_id)
            .await?
            .ok_or_else(|| {
                ParleyError::NotFound(format!("conversation {}", request.conversation_id))
            })?;
        let agent = self
            .agents
            .find_agent(&conversation.agent_id)
            .await?
            .ok_or_else(|| ParleyError::NotFound(format!("agent {}", conversation.agent_id)))?;

        if conversation.user_id != user_id {
            return Err(ParleyError::Forbidden(format!(
                "conversation {} belongs to another user",
                conversation.id
            )));
        }
        if !agent.is_accessible_by(user_id) {
            return Err(ParleyError::Forbidden(format!("agent {} is private", agent.id)));
        }
        Ok((conversation, agent))
    }

    /// Tools bound for one turn: the agent's catalog selection plus context
    /// retrieval scoped to the caller when threads are enabled.
    fn bind_tools(&self, agent: &Agent, user_id: &str, conversation_id: &str) -> ToolSet {
        let mut tools = self.catalog.select(&agent.tools);
        if agent.enable_threads {
            tools.insert(Arc::new(
                ContextRetrievalTool::new(self.conversations.clone(), user_id)
                    .excluding(conversation_id),
            ));
        }
        tools
    }

    fn failure(
        &self,
        events: &EventFactory,
        conversation_id: &str,
        message_id: &str,
        err: ParleyError,
    ) -> ProtocolEvent {
        tracing::warn!(conversation_id, message_id, error = %err, "chat stream failed");
        events.failed(&err)
    }

    fn interrupted(
        &self,
        events: &EventFactory,
        conversation_id: &str,
        message_id: &str,
    ) -> ProtocolEvent {
        tracing::debug!(conversation_id, message_id, "chat stream interrupted");
        events.interrupted()
    }
}
