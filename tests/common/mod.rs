//! Shared test helpers: scripted backend, seeded store, failing store.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

use parley::error::{ParleyError, Result};
use parley::orchestrator::ChatStreamUseCase;
use parley::protocol::{EventKind, ProtocolEvent};
use parley::provider::{ChunkStream, ModelBackend, ModelRequest};
use parley::session::InMemorySessionRegistry;
use parley::store::{AgentStore, ConversationStore, MemoryStore};
use parley::types::*;

/// One scripted model response.
pub enum Script {
    Chunks(Vec<ModelChunk>),
    Fail(String),
}

/// A backend that replays scripted responses and records every request.
pub struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a plain text response, one chunk per `pieces` entry.
    pub fn queue_text(&self, pieces: &[&str]) -> &Self {
        let chunks = pieces.iter().map(|p| ModelChunk::text(*p)).collect();
        self.queue(Script::Chunks(chunks))
    }

    /// Queue a response requesting one tool call.
    pub fn queue_tool_call(&self, id: &str, name: &str, args: serde_json::Value) -> &Self {
        self.queue(Script::Chunks(vec![ModelChunk::tool_calls(vec![
            ToolCallFragment::new(id, name, as_map(args)),
        ])]))
    }

    pub fn queue_chunks(&self, chunks: Vec<ModelChunk>) -> &Self {
        self.queue(Script::Chunks(chunks))
    }

    pub fn queue_failure(&self, message: &str) -> &Self {
        self.queue(Script::Fail(message.to_string()))
    }

    fn queue(&self, script: Script) -> &Self {
        self.scripts.lock().unwrap().push_back(script);
        self
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn stream_chunks(&self, request: &ModelRequest) -> Result<ChunkStream> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ParleyError::Stream("script exhausted".into()))?;
        match script {
            Script::Chunks(chunks) => Ok(futures::stream::iter(chunks.into_iter().map(Ok)).boxed()),
            Script::Fail(message) => Err(ParleyError::api(500, message)),
        }
    }
}

pub fn as_map(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("expected a JSON object"),
    }
}

pub fn agent(id: &str, owner: &str, visibility: AgentVisibility) -> Agent {
    Agent {
        id: id.into(),
        owner_id: owner.into(),
        name: "Helper".into(),
        instructions: "Be helpful.".into(),
        tone: Some("calm".into()),
        visibility,
        enable_threads: false,
        tools: Vec::new(),
    }
}

/// Conversation "c1" owned by "u1" with private agent "a1" owned by "u1".
pub async fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store
        .insert_agent(agent("a1", "u1", AgentVisibility::Private))
        .await;
    store
        .insert_conversation(Conversation {
            id: "c1".into(),
            user_id: "u1".into(),
            agent_id: "a1".into(),
            title: None,
        })
        .await;
    store
}

/// Use case over `store` and `backend` with an isolated session registry.
pub fn use_case(
    store: Arc<MemoryStore>,
    backend: Arc<ScriptedBackend>,
) -> (ChatStreamUseCase, Arc<InMemorySessionRegistry>) {
    let sessions = Arc::new(InMemorySessionRegistry::new());
    let chat = ChatStreamUseCase::new(store.clone(), store, backend, sessions.clone());
    (chat, sessions)
}

pub async fn collect(stream: BoxStream<'static, ProtocolEvent>) -> Vec<ProtocolEvent> {
    stream.collect().await
}

pub fn kinds(events: &[ProtocolEvent]) -> Vec<EventKind> {
    events.iter().map(ProtocolEvent::kind).collect()
}

/// Store whose message writes always fail.
pub struct FailingStore {
    pub inner: Arc<MemoryStore>,
}

#[async_trait]
impl ConversationStore for FailingStore {
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        self.inner.get_conversation(id).await
    }

    async fn save_message(&self, _message: Message) -> Result<Message> {
        Err(ParleyError::Persistence("disk full".into()))
    }

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        self.inner.get_messages(conversation_id).await
    }

    async fn conversations_for_user(&self, user_id: &str) -> Result<Vec<Conversation>> {
        self.inner.conversations_for_user(user_id).await
    }
}

#[async_trait]
impl AgentStore for FailingStore {
    async fn find_agent(&self, id: &str) -> Result<Option<Agent>> {
        self.inner.find_agent(id).await
    }
}
