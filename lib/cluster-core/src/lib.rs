//! Shared types for the cluster API client
//!
//! This library provides:
//! - The error taxonomy used by the resolver and the protocol client
//! - PEM encoding, decoding and validation of certificate and key material
//! - The resolved connection bundle passed from resolver to client

pub mod config;
pub mod error;
pub mod pem;

pub use config::{ClusterEndpoint, ResolvedConfig, UserAuth};
pub use error::{BoxError, ClusterError, ErrorKind, Missing, ParseSource, Result};
pub use pem::{PemKind, PemMaterial};
