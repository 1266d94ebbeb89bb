//! Offline backend that replies with the last human turn.

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::ParleyError;
use crate::types::{ModelChunk, ModelRole};

use super::{ChunkStream, ModelBackend, ModelRequest};

/// Needs no credentials and never requests tools.
#[derive(Debug, Clone)]
pub struct EchoBackend {
    model: String,
}

impl EchoBackend {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }
}

#[async_trait]
impl ModelBackend for EchoBackend {
    fn name(&self) -> &str {
        "echo"
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn stream_chunks(&self, request: &ModelRequest) -> Result<ChunkStream, ParleyError> {
        let last_human = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == ModelRole::Human)
            .map(|m| m.content.clone())
            .unwrap_or_default();

        // One chunk per word, whitespace kept with the word it follows.
        let mut pieces = Vec::new();
        let mut current = String::new();
        for ch in last_human.chars() {
            current.push(ch);
            if ch.is_whitespace() {
                pieces.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            pieces.push(current);
        }

        Ok(futures::stream::iter(pieces.into_iter().map(|p| Ok(ModelChunk::text(p)))).boxed())
    }
}
