//! Structured-text formats the resolver can read configuration files with

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A text format that maps documents to and from a generic value tree
pub trait TextFormat: Send + Sync {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    fn parse(&self, text: &str) -> Result<Value, FormatError>;

    fn stringify(&self, value: &Value) -> Result<String, FormatError>;
}

/// YAML, the usual format of cluster configuration files
#[derive(Debug, Default, Clone, Copy)]
pub struct YamlFormat;

impl TextFormat for YamlFormat {
    fn name(&self) -> &'static str {
        "yaml"
    }

    fn parse(&self, text: &str) -> Result<Value, FormatError> {
        // An empty document is a null value, not an error
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_yaml::from_str(text)?)
    }

    fn stringify(&self, value: &Value) -> Result<String, FormatError> {
        Ok(serde_yaml::to_string(value)?)
    }
}

/// JSON, accepted because JSON documents are also valid configuration files
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormat;

impl TextFormat for JsonFormat {
    fn name(&self) -> &'static str {
        "json"
    }

    fn parse(&self, text: &str) -> Result<Value, FormatError> {
        Ok(serde_json::from_str(text)?)
    }

    fn stringify(&self, value: &Value) -> Result<String, FormatError> {
        Ok(serde_json::to_string_pretty(value)?)
    }
}
