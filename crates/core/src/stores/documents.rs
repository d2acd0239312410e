use super::{persist_atomically, read_optional, remove_if_exists, scope_key, ScopeLocks};
use crate::traits::DocumentStore;
use crate::{Document, StoreError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Default, Serialize, Deserialize)]
struct ScopeDocuments {
    scope: String,
    documents: Vec<Document>,
}

/// JSON document store, one file per scope.
pub struct FileDocumentStore {
    root: PathBuf,
    writers: ScopeLocks,
}

impl FileDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writers: ScopeLocks::default(),
        }
    }

    fn scope_path(&self, scope: &str) -> PathBuf {
        self.root.join(format!("{}.documents.json", scope_key(scope)))
    }

    async fn load(&self, scope: &str) -> Result<ScopeDocuments, StoreError> {
        match read_optional(&self.scope_path(scope)).await? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(ScopeDocuments {
                scope: scope.to_string(),
                documents: Vec::new(),
            }),
        }
    }

    /// Stores the document unless its id is already present. Returns whether it was added.
    pub async fn insert(&self, document: Document) -> Result<bool, StoreError> {
        let writer = self.writers.writer(&document.scope);
        let _guard = writer.lock().await;

        let mut stored = self.load(&document.scope).await?;
        if stored
            .documents
            .iter()
            .any(|existing| existing.document_id == document.document_id)
        {
            return Ok(false);
        }

        let path = self.scope_path(&document.scope);
        stored.documents.push(document);
        persist_atomically(path, serde_json::to_vec_pretty(&stored)?).await?;
        Ok(true)
    }

    pub async fn list(&self, scope: &str) -> Result<Vec<Document>, StoreError> {
        Ok(self.load(scope).await?.documents)
    }

    pub async fn delete_scope(&self, scope: &str) -> Result<(), StoreError> {
        let removed = {
            let writer = self.writers.writer(scope);
            let _guard = writer.lock().await;
            remove_if_exists(&self.scope_path(scope)).await
        };
        self.writers.release(scope);
        removed
    }
}

#[async_trait]
impl DocumentStore for FileDocumentStore {
    async fn get_by_ids(
        &self,
        scope: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Document>, StoreError> {
        Ok(self
            .load(scope)
            .await?
            .documents
            .into_iter()
            .filter(|document| ids.contains(&document.document_id))
            .map(|document| (document.document_id.clone(), document))
            .collect())
    }

    async fn count(&self, scope: &str) -> Result<usize, StoreError> {
        Ok(self.load(scope).await?.documents.len())
    }
}
