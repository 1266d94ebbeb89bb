//! Model backend trait and implementations.

pub mod echo;
pub mod http;

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(feature = "anthropic")]
pub mod anthropic;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use strum::{Display, EnumString, IntoStaticStr};

use crate::config::ParleyConfig;
use crate::error::ParleyError;
use crate::tools::ToolDefinition;
use crate::types::{GenerationSettings, ModelChunk, ModelMessage};

/// Lazy sequence of partial output chunks; the stream ending is the end of
/// the model response.
pub type ChunkStream = BoxStream<'static, Result<ModelChunk, ParleyError>>;

/// A request sent to a model backend.
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    pub messages: Vec<ModelMessage>,
    /// Bound tools; `None` asks for a plain text response.
    pub tools: Option<Vec<ToolDefinition>>,
    pub settings: GenerationSettings,
}

impl ModelRequest {
    pub fn new(messages: Vec<ModelMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Whether any tool is bound to this request.
    pub fn has_tools(&self) -> bool {
        self.tools.as_ref().is_some_and(|t| !t.is_empty())
    }
}

/// Core trait implemented by every model backend.
///
/// Backends only normalize their wire chunks into [`ModelChunk`]s; the tool
/// loop built on top is shared.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Backend name (e.g. "openai").
    fn name(&self) -> &str;

    /// Model identifier served by this backend instance.
    fn model_id(&self) -> &str;

    /// Open a streamed response.
    async fn stream_chunks(&self, request: &ModelRequest) -> Result<ChunkStream, ParleyError>;
}

/// Known backend families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum BackendKind {
    OpenAi,
    Anthropic,
    Echo,
}

/// A `provider:model` selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub kind: BackendKind,
    pub model: String,
}

impl FromStr for ModelSpec {
    type Err = ParleyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (provider, model) = s.split_once(':').ok_or_else(|| {
            ParleyError::Configuration(format!("expected provider:model, got '{s}'"))
        })?;
        let kind = provider
            .trim()
            .parse::<BackendKind>()
            .map_err(|_| ParleyError::Configuration(format!("unknown provider '{provider}'")))?;
        let model = model.trim();
        if model.is_empty() {
            return Err(ParleyError::Configuration(format!("missing model name in '{s}'")));
        }
        Ok(Self {
            kind,
            model: model.to_string(),
        })
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.model)
    }
}

/// Create a backend for the given model, using the provided config.
#[allow(unused_variables)]
pub fn create_backend(
    spec: &ModelSpec,
    config: &ParleyConfig,
) -> Result<Arc<dyn ModelBackend>, ParleyError> {
    match spec.kind {
        #[cfg(feature = "openai")]
        BackendKind::OpenAi => {
            let api_key = config
                .get_api_key("openai")
                .ok_or_else(|| ParleyError::Authentication("Missing OPENAI_API_KEY".into()))?;
            Ok(Arc::new(openai::OpenAiBackend::new(
                spec.model.clone(),
                api_key,
                config.get_base_url("openai"),
            )))
        }
        #[cfg(feature = "anthropic")]
        BackendKind::Anthropic => {
            let api_key = config
                .get_api_key("anthropic")
                .ok_or_else(|| ParleyError::Authentication("Missing ANTHROPIC_API_KEY".into()))?;
            Ok(Arc::new(anthropic::AnthropicBackend::new(
                spec.model.clone(),
                api_key,
                config.get_base_url("anthropic"),
            )))
        }
        BackendKind::Echo => Ok(Arc::new(echo::EchoBackend::new(spec.model.clone()))),
        #[allow(unreachable_patterns)]
        _ => Err(ParleyError::Configuration(format!(
            "Backend for model '{spec}' not enabled via feature flags"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_provider_and_model() {
        let spec: ModelSpec = "openai:gpt-4o-mini".parse().unwrap();
        assert_eq!(spec.kind, BackendKind::OpenAi);
        assert_eq!(spec.model, "gpt-4o-mini");
        assert_eq!(spec.to_string(), "openai:gpt-4o-mini");
    }

    #[test]
    fn rejects_malformed_specs() {
        assert!("gpt-4o".parse::<ModelSpec>().is_err());
        assert!("mystery:model".parse::<ModelSpec>().is_err());
        assert!("echo:".parse::<ModelSpec>().is_err());
    }

    #[test]
    fn echo_needs_no_credentials() {
        let spec: ModelSpec = "echo:parrot".parse().unwrap();
        let backend = create_backend(&spec, &ParleyConfig::new()).unwrap();
        assert_eq!(backend.name(), "echo");
        assert_eq!(backend.model_id(), "parrot");
    }

    #[cfg(feature = "openai")]
    #[test]
    fn missing_key_is_authentication_error() {
        let spec: ModelSpec = "openai:gpt-4o-mini".parse().unwrap();
        let err = create_backend(&spec, &ParleyConfig::new()).err().unwrap();
        assert!(matches!(err, ParleyError::Authentication(_)));
    }
}
