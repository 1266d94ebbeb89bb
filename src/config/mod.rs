//! Configuration system (layered: code > env > config file).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use serde::Deserialize;

use crate::error::{ParleyError, Result};

/// Global default config (lazy-initialized from file and env).
static DEFAULT_CONFIG: OnceLock<ParleyConfig> = OnceLock::new();

pub const DEFAULT_MODEL: &str = "openai:gpt-4o-mini";
pub const DEFAULT_BIND: &str = "127.0.0.1:8787";

/// Tunables of the streaming pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// Model calls with a bound tool set before the final tool-less call.
    pub max_tool_rounds: usize,
    /// Soft character limit of one `message.delta` chunk.
    pub delta_chunk_chars: usize,
    /// Client delay between `completed` and the automatic reset to `idle`.
    pub completed_grace_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            max_tool_rounds: 3,
            delta_chunk_chars: 20,
            completed_grace_ms: 1500,
        }
    }
}

/// On-disk shape of `parley.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    model: Option<String>,
    bind: Option<String>,
    stream: Option<StreamSettings>,
    api_keys: HashMap<String, String>,
    base_urls: HashMap<String, String>,
}

/// Layered configuration for Parley.
///
/// Values loaded from the config file are overridden by environment
/// variables, which are in turn overridden by explicit setters.
#[derive(Clone)]
pub struct ParleyConfig {
    api_keys: Arc<RwLock<HashMap<String, String>>>,
    base_urls: Arc<RwLock<HashMap<String, String>>>,
    model: String,
    bind: String,
    stream: StreamSettings,
}

impl std::fmt::Debug for ParleyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let providers: Vec<String> = self
            .api_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        f.debug_struct("ParleyConfig")
            .field("api_keys", &providers)
            .field("base_urls", &self.base_urls)
            .field("model", &self.model)
            .field("bind", &self.bind)
            .field("stream", &self.stream)
            .finish()
    }
}

impl Default for ParleyConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ParleyConfig {
    /// Create a config holding only defaults.
    pub fn new() -> Self {
        Self {
            api_keys: Arc::new(RwLock::new(HashMap::new())),
            base_urls: Arc::new(RwLock::new(HashMap::new())),
            model: DEFAULT_MODEL.to_string(),
            bind: DEFAULT_BIND.to_string(),
            stream: StreamSettings::default(),
        }
    }

    /// Default config file location (`<config_dir>/parley.toml`).
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "parley", "parley")
            .map(|dirs| dirs.config_dir().join("parley.toml"))
    }

    /// Read a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: FileConfig = toml::from_str(&raw).map_err(|e| {
            ParleyError::Configuration(format!("{}: {e}", path.display()))
        })?;

        let mut config = Self::new();
        if let Some(model) = file.model {
            config.model = model;
        }
        if let Some(bind) = file.bind {
            config.bind = bind;
        }
        if let Some(stream) = file.stream {
            config.stream = stream;
        }
        for (provider, key) in file.api_keys {
            config.set_api_key(&provider, key);
        }
        for (provider, url) in file.base_urls {
            config.set_base_url(&provider, url);
        }
        Ok(config)
    }

    /// Load from environment variables only (`.env` is honored).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::new();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Load the full stack: config file (explicit path, else the default
    /// location when it exists), then `.env` and environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::from_file(&path)?,
                None => Self::new(),
            },
        };
        let _ = dotenvy::dotenv();
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Get (or create) the global default config.
    pub fn global() -> &'static ParleyConfig {
        DEFAULT_CONFIG.get_or_init(|| {
            Self::load(None).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring unreadable config file");
                Self::from_env()
            })
        })
    }

    /// Apply environment overrides through `lookup`.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let key_mappings = [("OPENAI_API_KEY", "openai"), ("ANTHROPIC_API_KEY", "anthropic")];
        for (env_var, provider) in &key_mappings {
            if let Some(key) = lookup(env_var) {
                self.set_api_key(provider, key);
            }
        }

        let url_mappings = [
            ("OPENAI_BASE_URL", "openai"),
            ("ANTHROPIC_BASE_URL", "anthropic"),
        ];
        for (env_var, provider) in &url_mappings {
            if let Some(url) = lookup(env_var) {
                self.set_base_url(provider, url);
            }
        }

        if let Some(model) = lookup("PARLEY_MODEL") {
            self.model = model;
        }
        if let Some(bind) = lookup("PARLEY_BIND") {
            self.bind = bind;
        }
        if let Some(rounds) = parse_env(&lookup, "PARLEY_MAX_TOOL_ROUNDS") {
            self.stream.max_tool_rounds = rounds;
        }
        if let Some(chars) = parse_env(&lookup, "PARLEY_DELTA_CHUNK_CHARS") {
            self.stream.delta_chunk_chars = chars;
        }
        if let Some(grace) = parse_env(&lookup, "PARLEY_COMPLETED_GRACE_MS") {
            self.stream.completed_grace_ms = grace;
        }
    }

    pub fn set_api_key(&self, provider: &str, key: String) {
        self.api_keys
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.to_string(), key);
    }

    pub fn get_api_key(&self, provider: &str) -> Option<String> {
        self.api_keys
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
            .cloned()
    }

    pub fn set_base_url(&self, provider: &str, url: String) {
        self.base_urls
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider.to_string(), url);
    }

    pub fn get_base_url(&self, provider: &str) -> Option<String> {
        self.base_urls
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(provider)
            .cloned()
    }

    /// Check if a provider has an API key configured.
    pub fn has_credentials(&self, provider: &str) -> bool {
        self.get_api_key(provider).is_some()
    }

    /// Default model as `provider:model`.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    pub fn bind(&self) -> &str {
        &self.bind
    }

    pub fn set_bind(&mut self, bind: impl Into<String>) {
        self.bind = bind.into();
    }

    pub fn stream_settings(&self) -> StreamSettings {
        self.stream
    }

    pub fn set_stream_settings(&mut self, settings: StreamSettings) {
        self.stream = settings;
    }
}

fn parse_env<F, T>(lookup: &F, name: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "ignoring unparseable environment value");
            None
        }
    }
}
