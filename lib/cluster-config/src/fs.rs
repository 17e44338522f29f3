//! Filesystem access used while resolving configuration

use async_trait::async_trait;
use std::io;
use std::path::Path;

/// Read-only filesystem operations the resolver depends on
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    async fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Check whether a path can be accessed
    async fn exists(&self, path: &Path) -> bool;
}

/// [`FileSystem`] backed by `tokio::fs`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioFileSystem;

#[async_trait]
impl FileSystem for TokioFileSystem {
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        tokio::fs::read(path).await
    }

    async fn read_to_string(&self, path: &Path) -> io::Result<String> {
        tokio::fs::read_to_string(path).await
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::metadata(path).await.is_ok()
    }
}
