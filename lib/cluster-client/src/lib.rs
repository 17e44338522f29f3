//! HTTP client for the cluster REST API
//!
//! This library provides:
//! - A [`ClusterClient`] bound to one [`ResolvedConfig`](cluster_core::ResolvedConfig)
//! - CRUD, list, pod log and watch operations on arbitrary resource kinds
//! - REST path construction from apiVersion, kind, name and namespace
//! - TLS roots and client identity derived from the resolved configuration

pub mod client;
pub mod path;
pub mod tls;
pub mod watch;

pub use client::{ClientOptions, ClusterClient, ListOptions, RequestContext, WatchOptions};
pub use path::{pluralize, resource_path};
pub use tls::TlsClientConfig;
pub use watch::{WatchEvent, WatchEventType, WatchStream};
