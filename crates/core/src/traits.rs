use crate::{Document, EmbeddingMatch, StoreError};
use async_trait::async_trait;
use std::collections::HashMap;

/// Per-scope vector index keyed by document id.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Embeds and stores `text` under `document_id`. Re-adding an existing id is a no-op.
    async fn add(&self, scope: &str, document_id: &str, text: &str) -> Result<(), StoreError>;

    /// Up to `k` matches by descending similarity; empty when the scope has no entries.
    async fn search(
        &self,
        scope: &str,
        text: &str,
        k: usize,
    ) -> Result<Vec<EmbeddingMatch>, StoreError>;

    /// Drops the scope's index. Deleting a missing scope succeeds.
    async fn delete(&self, scope: &str) -> Result<(), StoreError>;

    async fn len(&self, scope: &str) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_by_ids(
        &self,
        scope: &str,
        ids: &[String],
    ) -> Result<HashMap<String, Document>, StoreError>;

    async fn count(&self, scope: &str) -> Result<usize, StoreError>;
}

#[async_trait]
impl<T: VectorIndex + ?Sized> VectorIndex for Box<T> {
    async fn add(&self, scope: &str, document_id: &str, text: &str) -> Result<(), StoreError> {
        (**self).add(scope, document_id, text).await
    }

    async fn search(
        &self,
        scope: &str,
        text: &str,
        k: usize,
    ) -> Result<Vec<EmbeddingMatch>, StoreError> {
        (**self).search(scope, text, k).await
    }

    async fn delete(&self, scope: &str) -> Result<(), StoreError> {
        (**self).delete(scope).await
    }

    async fn len(&self, scope: &str) -> Result<usize, StoreError> {
        (**self).len(scope).await
    }
}
