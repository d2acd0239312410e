use thiserror::Error;

/// Failure of an external capability (embedding, pairwise scoring, profile service).
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("{service} is unavailable: {details}")]
    Unavailable { service: String, details: String },

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt store file {path}: {details}")]
    Corrupt { path: String, details: String },

    #[error("embedding dimension {found} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("embedding failed: {0}")]
    Capability(#[from] CapabilityError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("background task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("no documents stored for scope {scope}")]
    EmptyPool { scope: String },

    #[error("invalid match options: {0}")]
    InvalidOptions(String),

    #[error("retrieval failed: {0}")]
    Retrieval(#[source] StoreError),

    #[error("reranking failed: {0}")]
    Rerank(#[source] CapabilityError),

    #[error("document store failed: {0}")]
    DocumentStore(#[source] StoreError),
}

impl MatchError {
    /// True when the request failed because an upstream capability or backend did,
    /// as opposed to the request itself being unacceptable.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(
            self,
            MatchError::Retrieval(_) | MatchError::Rerank(_) | MatchError::DocumentStore(_)
        )
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T, E = MatchError> = std::result::Result<T, E>;
