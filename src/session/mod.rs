//! Interrupt registry: one cancellable session per conversation.
//!
//! The registry is an injected component rather than process-global state so
//! each composition root (and each test) owns an isolated instance.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio_util::sync::CancellationToken;

/// The in-flight stream of one conversation.
#[derive(Debug, Clone)]
pub struct StreamSession {
    pub message_id: String,
    pub cancel: CancellationToken,
}

impl StreamSession {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            cancel: CancellationToken::new(),
        }
    }

    /// Whether an interrupt has been requested.
    pub fn is_aborted(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Conversation id → in-flight stream session.
///
/// Implementations must be safe to call from the owning stream and from a
/// concurrent control call at the same time.
pub trait SessionRegistry: Send + Sync {
    /// Register a new session for `conversation_id`.
    ///
    /// An existing session is superseded: its token is cancelled and the entry
    /// replaced.
    fn register(&self, conversation_id: &str, message_id: &str) -> StreamSession;

    fn get(&self, conversation_id: &str) -> Option<StreamSession>;

    /// Flag the conversation's session as aborted. Returns whether one existed.
    fn interrupt(&self, conversation_id: &str) -> bool;

    /// Delete the session if it still belongs to `message_id`.
    fn remove(&self, conversation_id: &str, message_id: &str);
}

/// Process-local registry behind a `std::sync::RwLock`.
#[derive(Debug, Default)]
pub struct InMemorySessionRegistry {
    sessions: RwLock<HashMap<String, StreamSession>>,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionRegistry for InMemorySessionRegistry {
    fn register(&self, conversation_id: &str, message_id: &str) -> StreamSession {
        let session = StreamSession::new(message_id);
        let previous = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conversation_id.to_string(), session.clone());
        if let Some(previous) = previous {
            tracing::debug!(
                conversation_id,
                superseded = %previous.message_id,
                message_id,
                "superseding in-flight stream"
            );
            previous.cancel.cancel();
        }
        session
    }

    fn get(&self, conversation_id: &str) -> Option<StreamSession> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(conversation_id)
            .cloned()
    }

    fn interrupt(&self, conversation_id: &str) -> bool {
        match self.get(conversation_id) {
            Some(session) => {
                session.cancel.cancel();
                true
            }
            None => false,
        }
    }

    fn remove(&self, conversation_id: &str, message_id: &str) {
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if sessions
            .get(conversation_id)
            .is_some_and(|s| s.message_id == message_id)
        {
            sessions.remove(conversation_id);
        }
    }
}

/// Removes its session from the registry when dropped.
pub struct SessionGuard {
    registry: Arc<dyn SessionRegistry>,
    conversation_id: String,
    session: StreamSession,
}

impl SessionGuard {
    /// Register a session and tie its removal to the returned guard.
    pub fn register(
        registry: Arc<dyn SessionRegistry>,
        conversation_id: impl Into<String>,
        message_id: &str,
    ) -> Self {
        let conversation_id = conversation_id.into();
        let session = registry.register(&conversation_id, message_id);
        Self {
            registry,
            conversation_id,
            session,
        }
    }

    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    pub fn is_aborted(&self) -> bool {
        self.session.is_aborted()
    }

    pub fn token(&self) -> CancellationToken {
        self.session.cancel.clone()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry
            .remove(&self.conversation_id, &self.session.message_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_flags_existing_session() {
        let registry = InMemorySessionRegistry::new();
        let session = registry.register("c1", "m1");
        assert!(registry.interrupt("c1"));
        assert!(session.is_aborted());
        assert!(!registry.interrupt("c2"));
    }

    #[test]
    fn second_register_supersedes_first() {
        let registry = InMemorySessionRegistry::new();
        let first = registry.register("c1", "m1");
        let second = registry.register("c1", "m2");
        assert!(first.is_aborted());
        assert!(!second.is_aborted());
        assert_eq!(registry.get("c1").unwrap().message_id, "m2");
    }

    #[test]
    fn remove_ignores_stale_message_id() {
        let registry = InMemorySessionRegistry::new();
        registry.register("c1", "m1");
        registry.register("c1", "m2");
        registry.remove("c1", "m1");
        assert_eq!(registry.get("c1").unwrap().message_id, "m2");
        registry.remove("c1", "m2");
        assert!(registry.is_empty());
    }

    #[test]
    fn guard_removes_on_drop() {
        let registry = Arc::new(InMemorySessionRegistry::new());
        {
            let guard = SessionGuard::register(registry.clone(), "c1", "m1");
            assert!(!guard.is_aborted());
            assert_eq!(registry.len(), 1);
        }
        assert!(registry.get("c1").is_none());
    }
}
