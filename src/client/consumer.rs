//! Client-side stream consumer state machine.
//!
//! ```text
//! idle -> connecting -> streaming -> completed -> idle (after the grace delay)
//! idle | connecting | streaming -> error
//! any -> idle (interrupt)
//! ```
//!
//! All public methods take `&self`; the consumer is shared through an `Arc`
//! and exposes its state through a [`watch`] channel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use strum::Display;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::events::ClientEvent;
use super::transport::ChatTransport;
use crate::config::StreamSettings;
use crate::error::{ParleyError, Result};
use crate::protocol::{ActionDecision, ChatStreamRequest, ControlAck, ControlRequest};
use crate::types::Message;
use crate::wire::decode_frames;

/// Consumer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConsumerState {
    Idle,
    Connecting,
    Streaming,
    Completed,
    Error,
}

/// A server request awaiting a confirm/cancel/modify decision.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAction {
    pub conversation_id: String,
    pub action_id: String,
    pub payload: serde_json::Value,
}

type DeltaCallback = Arc<dyn Fn(&str) + Send + Sync>;
type CompleteCallback = Arc<dyn Fn(Option<&Message>) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&ParleyError) + Send + Sync>;

#[derive(Default, Clone)]
struct Callbacks {
    on_delta: Option<DeltaCallback>,
    on_complete: Option<CompleteCallback>,
    on_error: Option<ErrorCallback>,
}

#[derive(Default)]
struct Control {
    /// Bumped by every send and interrupt; work from an older generation
    /// never touches state.
    generation: u64,
    token: Option<CancellationToken>,
    conversation_id: Option<String>,
    pending_action: Option<PendingAction>,
    last_message: Option<Message>,
}

struct Inner {
    transport: Arc<dyn ChatTransport>,
    state_tx: watch::Sender<ConsumerState>,
    control: Mutex<Control>,
    callbacks: Callbacks,
    grace: Duration,
}

/// Turns a chat stream into callbacks and observable state.
#[derive(Clone)]
pub struct StreamConsumer {
    inner: Arc<Inner>,
}

/// Builder for [`StreamConsumer`].
pub struct StreamConsumerBuilder {
    transport: Arc<dyn ChatTransport>,
    callbacks: Callbacks,
    grace: Duration,
}

impl StreamConsumerBuilder {
    /// Delay between `completed` and the automatic reset to `idle`.
    pub fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn settings(self, settings: &StreamSettings) -> Self {
        self.grace(Duration::from_millis(settings.completed_grace_ms))
    }

    pub fn on_delta(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.callbacks.on_delta = Some(Arc::new(f));
        self
    }

    /// Called when the stream ends normally; receives the persisted message
    /// when the server sent one.
    pub fn on_complete(mut self, f: impl Fn(Option<&Message>) + Send + Sync + 'static) -> Self {
        self.callbacks.on_complete = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&ParleyError) + Send + Sync + 'static) -> Self {
        self.callbacks.on_error = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> StreamConsumer {
        let (state_tx, _) = watch::channel(ConsumerState::Idle);
        StreamConsumer {
            inner: Arc::new(Inner {
                transport: self.transport,
                state_tx,
                control: Mutex::new(Control::default()),
                callbacks: self.callbacks,
                grace: self.grace,
            }),
        }
    }
}

impl StreamConsumer {
    pub fn builder(transport: Arc<dyn ChatTransport>) -> StreamConsumerBuilder {
        StreamConsumerBuilder {
            transport,
            callbacks: Callbacks::default(),
            grace: Duration::from_millis(StreamSettings::default().completed_grace_ms),
        }
    }

    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self::builder(transport).build()
    }

    pub fn state(&self) -> ConsumerState {
        *self.inner.state_tx.borrow()
    }

    /// Subscribe to state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConsumerState> {
        self.inner.state_tx.subscribe()
    }

    pub fn pending_action(&self) -> Option<PendingAction> {
        self.inner.lock().pending_action.clone()
    }

    /// Start streaming a reply to `text`.
    ///
    /// Any in-flight send is cancelled first (last send wins). The returned
    /// handle finishes when this send stops consuming.
    pub fn send_message(
        &self,
        conversation_id: impl Into<String>,
        text: impl Into<String>,
    ) -> JoinHandle<()> {
        let request = ChatStreamRequest::new(conversation_id, text);
        let token = CancellationToken::new();
        let generation = {
            let mut control = self.inner.lock();
            if let Some(previous) = control.token.replace(token.clone()) {
                previous.cancel();
            }
            control.generation += 1;
            control.conversation_id = Some(request.conversation_id.clone());
            control.pending_action = None;
            control.last_message = None;
            control.generation
        };
        self.inner.set_state(ConsumerState::Connecting);
        tracing::debug!(conversation_id = %request.conversation_id, generation, "send");

        let inner = self.inner.clone();
        tokio::spawn(async move { inner.run(generation, token, request).await })
    }

    /// Stop the current stream.
    ///
    /// The local stream is cancelled at once and the state forced to `idle`
    /// without passing through `completed`. The server is then notified on a
    /// best-effort basis; the return value is whether it acknowledged.
    pub async fn interrupt(&self) -> bool {
        let conversation_id = {
            let mut control = self.inner.lock();
            if let Some(token) = control.token.take() {
                token.cancel();
            }
            control.generation += 1;
            control.pending_action = None;
            control.conversation_id.take()
        };
        self.inner.set_state(ConsumerState::Idle);

        let Some(conversation_id) = conversation_id else {
            return false;
        };
        match self
            .inner
            .transport
            .control(&ControlRequest::interrupt(&conversation_id))
            .await
        {
            Ok(ack) => {
                tracing::debug!(%conversation_id, ok = ack.ok, "interrupt acknowledged");
                ack.ok
            }
            Err(e) => {
                tracing::warn!(%conversation_id, error = %e, "interrupt notification failed");
                false
            }
        }
    }

    /// Answer the pending action and clear it.
    pub async fn resolve_action(
        &self,
        decision: ActionDecision,
        parameters_override: Option<serde_json::Value>,
    ) -> Result<ControlAck> {
        let action = self
            .inner
            .lock()
            .pending_action
            .take()
            .ok_or_else(|| ParleyError::InvalidState("no pending action".into()))?;
        self.inner
            .transport
            .control(&ControlRequest::Action {
                conversation_id: action.conversation_id,
                action_id: action.action_id,
                decision,
                parameters_override,
            })
            .await
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConsumerState) {
        self.state_tx.send_replace(state);
    }

    fn state(&self) -> ConsumerState {
        *self.state_tx.borrow()
    }

    /// Whether `generation` is still the live send.
    fn is_current(&self, generation: u64, token: &CancellationToken) -> bool {
        !token.is_cancelled() && self.lock().generation == generation
    }

    async fn run(self: Arc<Self>, generation: u64, token: CancellationToken, request: ChatStreamRequest) {
        let opened = tokio::select! {
            _ = token.cancelled() => return,
            opened = self.transport.open(&request) => opened,
        };
        let bytes = match opened {
            Ok(bytes) => bytes,
            Err(e) => {
                self.fail(generation, &token, e);
                return;
            }
        };

        let mut frames = decode_frames(bytes);
        loop {
            let next = tokio::select! {
                _ = token.cancelled() => return,
                next = frames.next() => next,
            };
            let frame = match next {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    self.fail(generation, &token, e);
                    return;
                }
                None => {
                    // Transport closed without an explicit end event.
                    if matches!(
                        self.state(),
                        ConsumerState::Connecting | ConsumerState::Streaming
                    ) {
                        self.complete(generation, &token);
                    }
                    return;
                }
            };

            if !self.is_current(generation, &token) {
                return;
            }
            let Some(event) = ClientEvent::from_frame(&frame) else {
                continue;
            };
            if !self.apply(generation, &token, event) {
                return;
            }
        }
    }

    /// Apply one event; returns whether the stream continues.
    fn apply(self: &Arc<Self>, generation: u64, token: &CancellationToken, event: ClientEvent) -> bool {
        match event {
            ClientEvent::Start { .. } => {
                if self.state() == ConsumerState::Connecting {
                    self.set_state(ConsumerState::Streaming);
                }
                true
            }
            ClientEvent::Delta { text } => {
                if self.state() == ConsumerState::Connecting {
                    self.set_state(ConsumerState::Streaming);
                }
                if let Some(on_delta) = &self.callbacks.on_delta {
                    on_delta(&text);
                }
                true
            }
            ClientEvent::Message(message) => {
                self.lock().last_message = Some(*message);
                true
            }
            ClientEvent::ActionRequired { action_id, payload } => {
                let mut control = self.lock();
                let conversation_id = control.conversation_id.clone().unwrap_or_default();
                control.pending_action = Some(PendingAction {
                    conversation_id,
                    action_id,
                    payload,
                });
                true
            }
            ClientEvent::End { interrupted } => {
                tracing::debug!(generation, interrupted, "stream ended");
                self.complete(generation, token);
                false
            }
            ClientEvent::Error { code, message } => {
                let detail = match code {
                    Some(code) => format!("{code}: {message}"),
                    None => message,
                };
                self.fail(generation, token, ParleyError::Stream(detail));
                false
            }
        }
    }

    fn complete(self: &Arc<Self>, generation: u64, token: &CancellationToken) {
        if !self.is_current(generation, token) {
            return;
        }
        let message = self.lock().last_message.take();
        self.set_state(ConsumerState::Completed);
        if let Some(on_complete) = &self.callbacks.on_complete {
            on_complete(message.as_ref());
        }

        let inner = self.clone();
        let grace = self.grace;
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let current = inner.lock().generation == generation;
            if current && inner.state() == ConsumerState::Completed {
                inner.set_state(ConsumerState::Idle);
            }
        });
    }

    fn fail(&self, generation: u64, token: &CancellationToken, err: ParleyError) {
        if !self.is_current(generation, token) {
            return;
        }
        tracing::warn!(generation, error = %err, "stream failed");
        self.set_state(ConsumerState::Error);
        if let Some(on_error) = &self.callbacks.on_error {
            on_error(&err);
        }
    }
}
