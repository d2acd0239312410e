pub mod documents;
pub mod file_index;
pub mod qdrant;

pub use documents::FileDocumentStore;
pub use file_index::FileIndexStore;
pub use qdrant::QdrantIndexStore;

use crate::StoreError;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::Mutex as AsyncMutex;

/// Stable, filesystem-safe name for a scope.
pub fn scope_key(scope: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scope.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// One async writer lock per scope. Readers never take it.
#[derive(Default)]
pub(crate) struct ScopeLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl ScopeLocks {
    pub(crate) fn writer(&self, scope: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(scope.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Forgets the scope's lock unless a writer still holds it.
    pub(crate) fn release(&self, scope: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks
            .get(scope)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(scope);
        }
    }
}

pub(crate) async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(error) => Err(error.into()),
    }
}

/// Writes through a sibling temp file and renames it over `path`, so readers see
/// either the previous file or the new one.
pub(crate) async fn persist_atomically(path: PathBuf, bytes: Vec<u8>) -> Result<(), StoreError> {
    tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent)?;
        let mut file = tempfile::NamedTempFile::new_in(&parent)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(&path).map_err(|error| StoreError::Io(error.error))?;
        Ok(())
    })
    .await
    .map_err(|error| StoreError::Task(error.to_string()))?
}

pub(crate) async fn remove_if_exists(path: &Path) -> Result<(), StoreError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(error) => Err(error.into()),
    }
}
