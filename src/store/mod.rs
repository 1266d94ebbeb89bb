//! Persistence collaborators consumed by the stream orchestrator.
//!
//! The orchestrator only needs create/read access keyed by conversation id.
//! [`MemoryStore`] implements both traits for tests, demos and `parley serve`.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Agent, Conversation, Message};

/// Conversation and message persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>>;

    /// Persist a message, assigning an id if absent.
    async fn save_message(&self, message: Message) -> Result<Message>;

    /// Messages of a conversation in insertion order.
    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>>;

    /// Conversations owned by a user.
    async fn conversations_for_user(&self, user_id: &str) -> Result<Vec<Conversation>>;
}

/// Agent lookup.
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn find_agent(&self, id: &str) -> Result<Option<Agent>>;
}

/// In-memory store backing both collaborator traits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    conversations: RwLock<HashMap<String, Conversation>>,
    messages: RwLock<HashMap<String, Vec<Message>>>,
    agents: RwLock<HashMap<String, Agent>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_conversation(&self, conversation: Conversation) {
        self.conversations
            .write()
            .await
            .insert(conversation.id.clone(), conversation);
    }

    pub async fn insert_agent(&self, agent: Agent) {
        self.agents.write().await.insert(agent.id.clone(), agent);
    }

    /// Total number of persisted messages across all conversations.
    pub async fn message_count(&self) -> usize {
        self.messages.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        Ok(self.conversations.read().await.get(id).cloned())
    }

    async fn save_message(&self, mut message: Message) -> Result<Message> {
        if message.id.is_none() {
            message.id = Some(Uuid::new_v4().to_string());
        }
        self.messages
            .write()
            .await
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<Message>> {
        Ok(self
            .messages
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn conversations_for_user(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let mut owned: Vec<Conversation> = self
            .conversations
            .read()
            .await
            .values()
            .filter(|c| c.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(owned)
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn find_agent(&self, id: &str) -> Result<Option<Agent>> {
        Ok(self.agents.read().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MessageRole;

    #[tokio::test]
    async fn save_assigns_missing_id_and_keeps_given_one() {
        let store = MemoryStore::new();
        let saved = store
            .save_message(Message::text("c1", MessageRole::User, "hi"))
            .await
            .unwrap();
        assert!(saved.id.is_some());

        let kept = store
            .save_message(Message::text("c1", MessageRole::Assistant, "yo").with_id("m-fixed"))
            .await
            .unwrap();
        assert_eq!(kept.id.as_deref(), Some("m-fixed"));
    }

    #[tokio::test]
    async fn messages_come_back_in_insertion_order() {
        let store = MemoryStore::new();
        for text in ["one", "two", "three"] {
            store
                .save_message(Message::text("c1", MessageRole::User, text))
                .await
                .unwrap();
        }
        let texts: Vec<_> = store
            .get_messages("c1")
            .await
            .unwrap()
            .iter()
            .map(Message::text_content)
            .collect();
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert!(store.get_messages("other").await.unwrap().is_empty());
    }
}
