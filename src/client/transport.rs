//! Transports that carry chat streams and control calls.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderValue, ACCEPT};

use crate::error::{ParleyError, Result};
use crate::protocol::{ChatStreamRequest, ControlAck, ControlRequest};
use crate::provider::http::{shared_client, status_to_error};

/// Raw response body of a chat stream.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Header carrying the caller's identity.
pub const USER_ID_HEADER: &str = "x-user-id";

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Start a stream and return its body.
    async fn open(&self, request: &ChatStreamRequest) -> Result<ByteStream>;

    /// Send a control call.
    async fn control(&self, request: &ControlRequest) -> Result<ControlAck>;
}

/// HTTP transport posting to `/chat/stream` and `/chat/control`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    user_id: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            user_id: user_id.into(),
            client: shared_client().clone(),
        }
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{path}", self.base_url))
            .header(USER_ID_HEADER, &self.user_id)
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, request: &ChatStreamRequest) -> Result<ByteStream> {
        let resp = self
            .post("/chat/stream")
            .header(ACCEPT, HeaderValue::from_static("text/event-stream"))
            .json(request)
            .send()
            .await
            .map_err(|e| ParleyError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body));
        }

        tracing::debug!(conversation_id = %request.conversation_id, "chat stream opened");
        Ok(resp
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ParleyError::Transport(e.to_string())))
            .boxed())
    }

    async fn control(&self, request: &ControlRequest) -> Result<ControlAck> {
        let resp = self
            .post("/chat/control")
            .json(request)
            .send()
            .await
            .map_err(|e| ParleyError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body));
        }
        resp.json::<ControlAck>()
            .await
            .map_err(|e| ParleyError::ProtocolDecode(e.to_string()))
    }
}
