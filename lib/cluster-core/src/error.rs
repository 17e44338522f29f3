use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::pem::PemKind;

pub type Result<T> = std::result::Result<T, ClusterError>;

/// Boxed cause carried by transport and request failures
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What could not be found while resolving a configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    /// The configuration file itself, or a service-account file
    File { path: PathBuf, reason: String },
    /// A certificate, key or token file named inside the configuration file
    ReferencedFile { path: PathBuf, reason: String },
    /// A context named by `current-context`
    Context(String),
    /// A cluster named by the selected context
    Cluster(String),
    /// A user named by the selected context
    User(String),
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::File { path, reason } => write!(f, "file {} ({})", path.display(), reason),
            Missing::ReferencedFile { path, reason } => {
                write!(f, "referenced file {} ({})", path.display(), reason)
            }
            Missing::Context(name) => write!(f, "context '{}'", name),
            Missing::Cluster(name) => write!(f, "cluster '{}'", name),
            Missing::User(name) => write!(f, "user '{}'", name),
        }
    }
}

/// Which input a [`ClusterError::Parsing`] failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseSource {
    /// Text of a cluster configuration file
    ConfigFile,
    /// Body of a REST response
    ResponseBody,
    /// One line of a watch stream
    WatchEvent,
}

/// Discriminant of [`ClusterError`], for callers that switch on the failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigFileNotFound,
    InvalidConfig,
    NotInCluster,
    ExecAuth,
    PemFormat,
    PemConversion,
    Parsing,
    Api,
    Network,
    Request,
}

#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Configuration not found: {0}")]
    ConfigFileNotFound(Missing),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not running in a cluster: {0}")]
    NotInCluster(String),

    #[error("Exec credential plugin '{command}' failed: {detail}")]
    ExecAuth { command: String, detail: String },

    #[error("Invalid PEM {kind} material")]
    PemFormat { kind: PemKind, material: String },

    #[error("Failed to convert {kind} material: {detail}")]
    PemConversion { kind: PemKind, detail: String },

    #[error("Failed to parse {context}: {detail}")]
    Parsing {
        origin: ParseSource,
        context: String,
        detail: String,
        raw: String,
    },

    #[error("API error (status {status_code}): {message}")]
    Api {
        status_code: u16,
        message: String,
        raw_body: String,
    },

    #[error("{message}: {source}")]
    Network {
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("Request {method} {resource} (namespace: {}) failed: {source}", .namespace.as_deref().unwrap_or("<none>"))]
    Request {
        method: String,
        resource: String,
        namespace: Option<String>,
        #[source]
        source: BoxError,
    },
}

impl ClusterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClusterError::ConfigFileNotFound(_) => ErrorKind::ConfigFileNotFound,
            ClusterError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            ClusterError::NotInCluster(_) => ErrorKind::NotInCluster,
            ClusterError::ExecAuth { .. } => ErrorKind::ExecAuth,
            ClusterError::PemFormat { .. } => ErrorKind::PemFormat,
            ClusterError::PemConversion { .. } => ErrorKind::PemConversion,
            ClusterError::Parsing { .. } => ErrorKind::Parsing,
            ClusterError::Api { .. } => ErrorKind::Api,
            ClusterError::Network { .. } => ErrorKind::Network,
            ClusterError::Request { .. } => ErrorKind::Request,
        }
    }

    /// Build a transport failure wrapping its cause
    pub fn network(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ClusterError::Network {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Build a parse failure keeping the text that failed to decode
    pub fn parsing(
        origin: ParseSource,
        context: impl Into<String>,
        detail: impl fmt::Display,
        raw: impl Into<String>,
    ) -> Self {
        ClusterError::Parsing {
            origin,
            context: context.into(),
            detail: detail.to_string(),
            raw: raw.into(),
        }
    }

    /// True for failures that mean "there is no usable configuration file".
    ///
    /// Only these justify falling back to the in-cluster configuration; every
    /// other failure points at a real problem inside an existing file.
    pub fn is_config_file_failure(&self) -> bool {
        match self {
            ClusterError::ConfigFileNotFound(Missing::File { .. }) => true,
            ClusterError::Parsing {
                origin: ParseSource::ConfigFile,
                ..
            } => true,
            _ => false,
        }
    }

    /// Check if the API answered 404
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::Api { status_code: 404, .. })
    }

    /// HTTP status code of an API failure
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClusterError::Api { status_code, .. } => Some(*status_code),
            _ => None,
        }
    }
}
