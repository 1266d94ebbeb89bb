//! Typed access to tool call arguments.

use crate::error::ParleyError;

/// Wrapper around accumulated tool call arguments providing typed extraction.
#[derive(Debug, Clone, Default)]
pub struct ToolArguments {
    values: serde_json::Map<String, serde_json::Value>,
}

impl ToolArguments {
    pub fn new(values: serde_json::Map<String, serde_json::Value>) -> Self {
        Self { values }
    }

    /// Build from any JSON value; non-objects yield empty arguments.
    pub fn from_value(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(values) => Self { values },
            _ => Self::default(),
        }
    }

    /// The raw argument map.
    pub fn raw(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.values
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str, ParleyError> {
        self.values
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ParleyError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    /// Get an integer argument.
    pub fn get_i64(&self, key: &str) -> Result<i64, ParleyError> {
        self.values
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ParleyError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    /// Get an optional integer argument.
    pub fn get_i64_opt(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(|v| v.as_i64())
    }

    /// Get a boolean argument.
    pub fn get_bool(&self, key: &str) -> Result<bool, ParleyError> {
        self.values
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| ParleyError::InvalidArgument(format!("Missing boolean argument: {key}")))
    }

    /// Deserialize the arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, ParleyError> {
        serde_json::from_value(serde_json::Value::Object(self.values.clone()))
            .map_err(|e| ParleyError::InvalidArgument(format!("Failed to deserialize arguments: {e}")))
    }
}
