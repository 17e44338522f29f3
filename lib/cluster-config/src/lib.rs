//! Cluster connection and credential resolution
//!
//! This library provides:
//! - Loading of cluster configuration files (kubeconfig format) and selection
//!   of the current context
//! - In-cluster resolution from service-account material
//! - Exec credential plugins run with an enforced timeout
//! - File-then-in-cluster fallback for callers that accept either source

pub mod env;
pub mod exec;
pub mod format;
pub mod fs;
pub mod kubeconfig;
pub mod resolver;

pub use env::ResolverEnv;
pub use exec::{CommandOutput, CommandRunner, ExecRequest, TokioCommandRunner};
pub use format::{FormatError, JsonFormat, TextFormat, YamlFormat};
pub use fs::{FileSystem, TokioFileSystem};
pub use resolver::ConfigResolver;
