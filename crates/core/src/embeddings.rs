use crate::CapabilityError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Text to unit-vector capability. Implementations must be deterministic for identical input.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;
    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError>;
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for Arc<T> {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        (**self).embed(text).await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        Ok(self.embed_sync(text))
    }
}

/// Client for a text-embeddings-inference style `/embed` endpoint.
pub struct HttpEmbedder {
    endpoint: Url,
    client: Client,
    dimensions: usize,
}

impl HttpEmbedder {
    pub fn new(endpoint: &str, dimensions: usize) -> Result<Self, CapabilityError> {
        Ok(Self {
            endpoint: service_url(endpoint, "embed")?,
            client: Client::new(),
            dimensions,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, CapabilityError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({ "inputs": text, "normalize": true }))
            .send()
            .await
            .map_err(|error| CapabilityError::Unavailable {
                service: "embedding".to_string(),
                details: error.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CapabilityError::Unavailable {
                service: "embedding".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let mut vector = parse_embedding(&parsed).ok_or_else(|| CapabilityError::BackendResponse {
            backend: "embedding".to_string(),
            details: "response is not a numeric vector".to_string(),
        })?;

        if vector.len() != self.dimensions {
            return Err(CapabilityError::BackendResponse {
                backend: "embedding".to_string(),
                details: format!(
                    "expected {} dimensions, got {}",
                    self.dimensions,
                    vector.len()
                ),
            });
        }

        normalize(&mut vector);
        Ok(vector)
    }
}

/// Resolves `path` below `base`, keeping every path segment of `base`.
pub(crate) fn service_url(base: &str, path: &str) -> Result<Url, url::ParseError> {
    let mut base = Url::parse(base)?;
    if !base.path().ends_with('/') {
        let directory = format!("{}/", base.path());
        base.set_path(&directory);
    }
    base.join(path)
}

// Accepts both `[[f32]]` (batched) and `[f32]` payloads.
fn parse_embedding(value: &Value) -> Option<Vec<f32>> {
    let array = value.as_array()?;
    let row = match array.first() {
        Some(Value::Array(inner)) => inner,
        _ => array,
    };
    row.iter()
        .map(|item| item.as_f64().map(|number| number as f32))
        .collect()
}

pub fn normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

pub fn cosine(left: &[f32], right: &[f32]) -> f64 {
    left.iter()
        .zip(right.iter())
        .map(|(a, b)| f64::from(*a) * f64::from(*b))
        .sum()
}
