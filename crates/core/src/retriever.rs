use crate::traits::VectorIndex;
use crate::{EmbeddingMatch, StoreError};
use std::collections::HashSet;
use tracing::info;

/// Judge 1: vector retrieval over a scope's index.
pub struct Retriever<V> {
    index: V,
}

impl<V: VectorIndex> Retriever<V> {
    pub fn new(index: V) -> Self {
        Self { index }
    }

    /// Errors from the index (including an unreachable embedding service) are returned
    /// as-is so callers can tell an outage apart from an empty scope.
    pub async fn retrieve(
        &self,
        scope: &str,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<EmbeddingMatch>, StoreError> {
        let hits = self.index.search(scope, query, top_k).await?;
        let raw_count = hits.len();
        let unique = dedup_matches(hits);
        info!(scope, raw_count, unique = unique.len(), "embedding retrieval finished");
        Ok(unique)
    }
}

/// Keeps the first occurrence of every document id, preserving order.
pub fn dedup_matches(hits: Vec<EmbeddingMatch>) -> Vec<EmbeddingMatch> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|hit| seen.insert(hit.document_id.clone()))
        .collect()
}
