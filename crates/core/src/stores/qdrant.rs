use super::scope_key;
use crate::embeddings::Embedder;
use crate::models::round4;
use crate::traits::VectorIndex;
use crate::{EmbeddingMatch, StoreError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

/// Vector index backed by Qdrant's REST API, one collection per scope.
pub struct QdrantIndexStore<E> {
    endpoint: String,
    collection_prefix: String,
    client: Client,
    embedder: E,
}

impl<E: Embedder> QdrantIndexStore<E> {
    pub fn new(endpoint: impl Into<String>, collection_prefix: impl Into<String>, embedder: E) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection_prefix: collection_prefix.into(),
            client: Client::new(),
            embedder,
        }
    }

    pub fn collection_name(&self, scope: &str) -> String {
        format!("{}_{}", self.collection_prefix, &scope_key(scope)[..16])
    }

    fn collection_url(&self, scope: &str) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection_name(scope))
    }

    async fn ensure_collection(&self, scope: &str) -> Result<(), StoreError> {
        let response = self.client.get(self.collection_url(scope)).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status()));
        }

        let response = self
            .client
            .put(self.collection_url(scope))
            .json(&json!({
                "vectors": {
                    "size": self.embedder.dimensions(),
                    "distance": "Cosine"
                }
            }))
            .send()
            .await?;

        // Another writer may have created it in between.
        if response.status().is_success() || response.status() == StatusCode::CONFLICT {
            Ok(())
        } else {
            Err(backend_error(response.status()))
        }
    }

    async fn point_exists(&self, scope: &str, point_id: &Uuid) -> Result<bool, StoreError> {
        let response = self
            .client
            .get(format!("{}/points/{}", self.collection_url(scope), point_id))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(backend_error(status)),
        }
    }
}

#[async_trait]
impl<E: Embedder> VectorIndex for QdrantIndexStore<E> {
    async fn add(&self, scope: &str, document_id: &str, text: &str) -> Result<(), StoreError> {
        self.ensure_collection(scope).await?;

        let point_id = point_id(document_id);
        if self.point_exists(scope, &point_id).await? {
            debug!(scope, document_id, "document already indexed, skipping");
            return Ok(());
        }

        let vector = self.embedder.embed(text).await?;
        if vector.len() != self.embedder.dimensions() {
            return Err(StoreError::DimensionMismatch {
                expected: self.embedder.dimensions(),
                found: vector.len(),
            });
        }

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url(scope)))
            .json(&json!({
                "points": [{
                    "id": point_id.to_string(),
                    "vector": vector,
                    "payload": { "document_id": document_id, "scope": scope },
                }]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }

    async fn search(
        &self,
        scope: &str,
        text: &str,
        k: usize,
    ) -> Result<Vec<EmbeddingMatch>, StoreError> {
        if k == 0 || self.len(scope).await? == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(text).await?;
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url(scope)))
            .json(&json!({
                "vector": query_vector,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        Ok(parse_search_hits(&parsed))
    }

    async fn delete(&self, scope: &str) -> Result<(), StoreError> {
        let response = self.client.delete(self.collection_url(scope)).send().await?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(backend_error(response.status()))
        }
    }

    async fn len(&self, scope: &str) -> Result<usize, StoreError> {
        let response = self.client.get(self.collection_url(scope)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(0);
        }
        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        Ok(parsed
            .pointer("/result/points_count")
            .and_then(Value::as_u64)
            .unwrap_or(0) as usize)
    }
}

/// Qdrant only accepts integer or UUID point ids.
pub fn point_id(document_id: &str) -> Uuid {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

fn parse_search_hits(parsed: &Value) -> Vec<EmbeddingMatch> {
    parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .filter_map(|hit| {
                    let document_id = hit.pointer("/payload/document_id").and_then(Value::as_str)?;
                    let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
                    Some(EmbeddingMatch {
                        document_id: document_id.to_string(),
                        score: round4(score),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn backend_error(status: StatusCode) -> StoreError {
    StoreError::BackendResponse {
        backend: "qdrant".to_string(),
        details: status.to_string(),
    }
}
