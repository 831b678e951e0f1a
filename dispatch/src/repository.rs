//! Persistence of the request document.
//!
//! The whole request list is persisted as a single JSON document after
//! every state change, newest first, mirroring how it is held in memory.
//! The trait is object-safe so the environment can hold any backing store
//! behind an `Arc<dyn RequestRepository>`.

use crate::types::ServiceRequest;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use thiserror::Error;

/// Errors from loading or persisting the request document
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Underlying filesystem failure
    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// The document could not be encoded or decoded
    #[error("storage serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Boxed future returned by repository operations
pub type RepositoryFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Durable storage for the full request list
///
/// Implementations persist the list as one document; there is no per-record
/// addressing. `load_all` on a store that was never written returns an
/// empty list, not an error.
pub trait RequestRepository: Send + Sync {
    /// Load every persisted request, newest first
    fn load_all(&self) -> RepositoryFuture<'_, Vec<ServiceRequest>>;

    /// Replace the persisted document with this snapshot
    fn persist_all(&self, records: Vec<ServiceRequest>) -> RepositoryFuture<'_, ()>;
}

/// Repository that keeps the document in memory
///
/// Used in tests and in ephemeral deployments where durability across
/// restarts is not needed.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    records: tokio::sync::RwLock<Vec<ServiceRequest>>,
}

impl InMemoryRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RequestRepository for InMemoryRepository {
    fn load_all(&self) -> RepositoryFuture<'_, Vec<ServiceRequest>> {
        Box::pin(async move { Ok(self.records.read().await.clone()) })
    }

    fn persist_all(&self, records: Vec<ServiceRequest>) -> RepositoryFuture<'_, ()> {
        Box::pin(async move {
            *self.records.write().await = records;
            Ok(())
        })
    }
}

/// Repository backed by a pretty-printed JSON file
///
/// The document lives at `<dir>/<namespace>.json`. Writes go to a sibling
/// temp file first and are renamed into place, so a crash mid-write leaves
/// the previous document intact. Timestamps round-trip exactly through
/// RFC 3339.
#[derive(Debug, Clone)]
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    /// Create a repository storing its document under `dir`
    #[must_use]
    pub fn new(dir: impl AsRef<Path>, namespace: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("{namespace}.json")),
        }
    }

    /// Path of the backing document
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RequestRepository for JsonFileRepository {
    fn load_all(&self) -> RepositoryFuture<'_, Vec<ServiceRequest>> {
        Box::pin(async move {
            let bytes = match tokio::fs::read(&self.path).await {
                Ok(bytes) => bytes,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    tracing::debug!(path = %self.path.display(), "No request document yet");
                    return Ok(Vec::new());
                },
                Err(err) => return Err(err.into()),
            };

            let records: Vec<ServiceRequest> = serde_json::from_slice(&bytes)?;
            tracing::debug!(
                path = %self.path.display(),
                count = records.len(),
                "Loaded request document"
            );
            Ok(records)
        })
    }

    fn persist_all(&self, records: Vec<ServiceRequest>) -> RepositoryFuture<'_, ()> {
        Box::pin(async move {
            if let Some(parent) = self.path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let bytes = serde_json::to_vec_pretty(&records)?;
            let tmp = self.path.with_extension("json.tmp");
            tokio::fs::write(&tmp, &bytes).await?;
            tokio::fs::rename(&tmp, &self.path).await?;

            tracing::trace!(
                path = %self.path.display(),
                count = records.len(),
                "Persisted request document"
            );
            Ok(())
        })
    }
}
