//! Blob Store Backends
//!
//! The external storage collaborator: opaque bytes by path. A single
//! `write_blob` call is atomic (readers see the old or the new bytes, never a
//! mix); nothing is promised across calls.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::StoreError;

/// Opaque-bytes-by-path storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Read a blob; `Ok(None)` when nothing was ever written at `path`
    async fn read_blob(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Replace the blob at `path`
    async fn write_blob(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError>;
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-local blob store
///
/// Used by tests and by the daemon's `memory` storage mode. Supports failure
/// injection so storage-failure paths can be exercised.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryBlobStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read fail (or stop failing)
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent write fail (or stop failing)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful writes so far
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Paths currently stored, sorted
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.blobs.read().keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Raw bytes at a path
    #[must_use]
    pub fn raw(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.read().get(path).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn read_blob(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!("injected read failure: {path}")));
        }
        Ok(self.blobs.read().get(path).cloned())
    }

    async fn write_blob(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!(
                "injected write failure: {path}"
            )));
        }
        self.blobs.write().insert(path.to_string(), bytes);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Filesystem backend
// ============================================================================

/// Blob store rooted at a local directory
///
/// Each blob is a `.json` file. Writes go to a uniquely named temporary file
/// in the same directory and are renamed over the target.
#[derive(Clone, Debug)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Create a store rooted at `root` (created lazily on first write)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if path.is_empty() || escapes {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(format!("{path}.json")))
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    fn name(&self) -> &str {
        "fs"
    }

    async fn read_blob(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let file = self.resolve(path)?;
        match tokio::fs::read(&file).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io {
                path: path.to_string(),
                source: e,
            }),
        }
    }

    async fn write_blob(&self, path: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let file = self.resolve(path)?;
        let io_err = |source: std::io::Error| StoreError::Io {
            path: path.to_string(),
            source,
        };

        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        let tmp = file.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, &bytes).await.map_err(io_err)?;
        if let Err(e) = tokio::fs::rename(&tmp, &file).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(io_err(e));
        }
        Ok(())
    }
}
