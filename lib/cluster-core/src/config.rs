//! Resolved connection bundle handed from the resolver to the client

use serde::{Deserialize, Serialize};

/// Everything needed to reach and authenticate against one cluster
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedConfig {
    pub cluster: ClusterEndpoint,
    pub user: UserAuth,
    /// Default namespace from the selected context or the service account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// API server location and the CA used to verify it
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterEndpoint {
    pub server: String,
    /// Base64 form of the CA as found in (or derived for) the configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_authority_pem: Option<String>,
    #[serde(default)]
    pub insecure_skip_tls_verify: bool,
}

impl ClusterEndpoint {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            certificate_authority_data: None,
            certificate_authority_pem: None,
            insecure_skip_tls_verify: false,
        }
    }
}

/// The single authentication mode selected for a user
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserAuth {
    /// Static bearer token, or one returned by an exec credential plugin
    Token { token: String },
    /// Client certificate and key for mutual TLS
    #[serde(rename_all = "camelCase")]
    ClientCertificate {
        client_certificate_data: String,
        client_key_data: String,
        client_certificate_pem: String,
        client_key_pem: String,
    },
}

impl UserAuth {
    pub fn token(&self) -> Option<&str> {
        match self {
            UserAuth::Token { token } => Some(token),
            UserAuth::ClientCertificate { .. } => None,
        }
    }

    /// Client certificate and key PEM, when authenticating with a certificate
    pub fn client_identity(&self) -> Option<(&str, &str)> {
        match self {
            UserAuth::ClientCertificate {
                client_certificate_pem,
                client_key_pem,
                ..
            } => Some((client_certificate_pem, client_key_pem)),
            UserAuth::Token { .. } => None,
        }
    }
}

// Credentials stay out of logs
impl std::fmt::Debug for UserAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UserAuth::Token { .. } => f.debug_struct("Token").field("token", &"<redacted>").finish(),
            UserAuth::ClientCertificate {
                client_certificate_data,
                ..
            } => f
                .debug_struct("ClientCertificate")
                .field("client_certificate_data", client_certificate_data)
                .field("client_key_data", &"<redacted>")
                .finish(),
        }
    }
}
