use super::{persist_atomically, read_optional, remove_if_exists, scope_key, ScopeLocks};
use crate::embeddings::{cosine, Embedder};
use crate::models::round4;
use crate::traits::VectorIndex;
use crate::{EmbeddingMatch, StoreError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

const FORMAT_VERSION: u32 = 1;

/// On-disk layout: ids and vectors live in one file so they can never be saved apart.
#[derive(Debug, Serialize, Deserialize)]
struct ScopeIndexFile {
    format: u32,
    scope: String,
    dimensions: usize,
    ids: Vec<String>,
    vectors: String,
}

#[derive(Debug, Clone, PartialEq)]
struct ScopeIndex {
    dimensions: usize,
    ids: Vec<String>,
    vectors: Vec<f32>,
}

impl ScopeIndex {
    fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    fn contains(&self, document_id: &str) -> bool {
        self.ids.iter().any(|id| id == document_id)
    }

    fn push(&mut self, document_id: &str, vector: &[f32]) -> Result<(), StoreError> {
        if vector.len() != self.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimensions,
                found: vector.len(),
            });
        }
        self.ids.push(document_id.to_string());
        self.vectors.extend_from_slice(vector);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Vec<EmbeddingMatch> {
        let mut scored = self
            .vectors
            .chunks_exact(self.dimensions)
            .zip(self.ids.iter())
            .map(|(row, id)| (id, cosine(query, row)))
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.1.total_cmp(&left.1));
        scored
            .into_iter()
            .take(k.min(self.ids.len()))
            .map(|(id, score)| EmbeddingMatch {
                document_id: id.clone(),
                score: round4(score),
            })
            .collect()
    }

    fn encode(&self, scope: &str) -> ScopeIndexFile {
        let bytes = self
            .vectors
            .iter()
            .flat_map(|value| value.to_le_bytes())
            .collect::<Vec<u8>>();
        ScopeIndexFile {
            format: FORMAT_VERSION,
            scope: scope.to_string(),
            dimensions: self.dimensions,
            ids: self.ids.clone(),
            vectors: STANDARD.encode(bytes),
        }
    }

    fn decode(file: ScopeIndexFile, path: &Path) -> Result<Self, StoreError> {
        let corrupt = |details: String| StoreError::Corrupt {
            path: path.display().to_string(),
            details,
        };

        if file.format != FORMAT_VERSION {
            return Err(corrupt(format!("unsupported format {}", file.format)));
        }
        if file.dimensions == 0 {
            return Err(corrupt("zero dimensions".to_string()));
        }

        let bytes = STANDARD
            .decode(file.vectors.as_bytes())
            .map_err(|error| corrupt(error.to_string()))?;
        if bytes.len() % 4 != 0 {
            return Err(corrupt(format!("vector payload of {} bytes", bytes.len())));
        }
        let vectors = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect::<Vec<_>>();

        if vectors.len() != file.ids.len() * file.dimensions {
            return Err(corrupt(format!(
                "{} ids but {} floats at dimension {}",
                file.ids.len(),
                vectors.len(),
                file.dimensions
            )));
        }

        Ok(Self {
            dimensions: file.dimensions,
            ids: file.ids,
            vectors,
        })
    }
}

/// Flat inner-product index persisted as one file per scope.
pub struct FileIndexStore<E> {
    root: PathBuf,
    embedder: E,
    writers: ScopeLocks,
}

impl<E: Embedder> FileIndexStore<E> {
    pub fn new(root: impl Into<PathBuf>, embedder: E) -> Self {
        Self {
            root: root.into(),
            embedder,
            writers: ScopeLocks::default(),
        }
    }

    fn scope_path(&self, scope: &str) -> PathBuf {
        self.root.join(format!("{}.index.json", scope_key(scope)))
    }

    async fn load(&self, scope: &str) -> Result<Option<ScopeIndex>, StoreError> {
        let path = self.scope_path(scope);
        let Some(bytes) = read_optional(&path).await? else {
            return Ok(None);
        };
        let file: ScopeIndexFile = serde_json::from_slice(&bytes)?;
        ScopeIndex::decode(file, &path).map(Some)
    }

    async fn save(&self, scope: &str, index: &ScopeIndex) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&index.encode(scope))?;
        persist_atomically(self.scope_path(scope), bytes).await
    }
}

#[async_trait]
impl<E: Embedder> VectorIndex for FileIndexStore<E> {
    async fn add(&self, scope: &str, document_id: &str, text: &str) -> Result<(), StoreError> {
        let writer = self.writers.writer(scope);
        let _guard = writer.lock().await;

        let existing = self.load(scope).await?;
        if existing
            .as_ref()
            .is_some_and(|index| index.contains(document_id))
        {
            debug!(scope, document_id, "document already indexed, skipping");
            return Ok(());
        }

        let vector = self.embedder.embed(text).await?;
        let mut index = existing.unwrap_or_else(|| ScopeIndex::new(vector.len()));
        index.push(document_id, &vector)?;
        self.save(scope, &index).await?;

        debug!(scope, document_id, entries = index.ids.len(), "document indexed");
        Ok(())
    }

    async fn search(
        &self,
        scope: &str,
        text: &str,
        k: usize,
    ) -> Result<Vec<EmbeddingMatch>, StoreError> {
        let index = match self.load(scope).await? {
            Some(index) if !index.ids.is_empty() => index,
            _ => return Ok(Vec::new()),
        };

        let query = self.embedder.embed(text).await?;
        if query.len() != index.dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: index.dimensions,
                found: query.len(),
            });
        }

        Ok(index.search(&query, k))
    }

    async fn delete(&self, scope: &str) -> Result<(), StoreError> {
        let removed = {
            let writer = self.writers.writer(scope);
            let _guard = writer.lock().await;
            remove_if_exists(&self.scope_path(scope)).await
        };
        self.writers.release(scope);
        removed
    }

    async fn len(&self, scope: &str) -> Result<usize, StoreError> {
        Ok(self
            .load(scope)
            .await?
            .map(|index| index.ids.len())
            .unwrap_or(0))
    }
}
