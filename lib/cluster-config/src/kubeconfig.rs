//! Cluster configuration file model
//!
//! Files use hyphenated keys (`current-context`, `certificate-authority-data`).
//! The parsed value tree is normalized to camel case before it is mapped onto
//! these types, so both spellings are accepted.

use cluster_core::{ClusterError, Missing, Result};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Parsed configuration file, discarded once a context is resolved
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfig {
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    #[serde(default)]
    pub users: Vec<NamedUser>,
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    #[serde(default)]
    pub current_context: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedCluster {
    pub name: String,
    pub cluster: RawCluster,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawCluster {
    pub server: String,
    /// Path to a PEM file
    #[serde(default)]
    pub certificate_authority: Option<String>,
    /// Base64 of PEM text or of DER bytes
    #[serde(default)]
    pub certificate_authority_data: Option<String>,
    #[serde(default)]
    pub insecure_skip_tls_verify: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedUser {
    pub name: String,
    #[serde(default)]
    pub user: RawUser,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUser {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_file: Option<String>,
    #[serde(default)]
    pub client_certificate: Option<String>,
    #[serde(default)]
    pub client_certificate_data: Option<String>,
    #[serde(default)]
    pub client_key: Option<String>,
    #[serde(default)]
    pub client_key_data: Option<String>,
    #[serde(default)]
    pub exec: Option<ExecConfig>,
}

/// Credential plugin descriptor
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<ExecEnvVar>,
    #[serde(default)]
    pub api_version: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecEnvVar {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub context: RawContext,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawContext {
    pub cluster: String,
    pub user: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl RawConfig {
    /// Map a parsed document onto the configuration model
    pub fn from_value(value: Value) -> Result<Self> {
        let normalized = match normalize_keys(value) {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        serde_json::from_value(normalized)
            .map_err(|e| ClusterError::InvalidConfig(format!("malformed configuration: {}", e)))
    }

    pub fn context(&self, name: &str) -> Result<&RawContext> {
        self.contexts
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.context)
            .ok_or_else(|| ClusterError::ConfigFileNotFound(Missing::Context(name.to_string())))
    }

    pub fn cluster(&self, name: &str) -> Result<&RawCluster> {
        self.clusters
            .iter()
            .find(|c| c.name == name)
            .map(|c| &c.cluster)
            .ok_or_else(|| ClusterError::ConfigFileNotFound(Missing::Cluster(name.to_string())))
    }

    pub fn user(&self, name: &str) -> Result<&RawUser> {
        self.users
            .iter()
            .find(|u| u.name == name)
            .map(|u| &u.user)
            .ok_or_else(|| ClusterError::ConfigFileNotFound(Missing::User(name.to_string())))
    }
}

/// Rewrite every object key from `hyphen-case` to `camelCase`, recursively
pub fn normalize_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (camel_case(&key), normalize_keys(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_keys).collect()),
        other => other,
    }
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for ch in key.chars() {
        if ch == '-' {
            upper_next = !out.is_empty();
            continue;
        }
        if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}
