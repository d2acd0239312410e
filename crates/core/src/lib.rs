pub mod assembler;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod fusion;
pub mod ingest;
pub mod matcher;
pub mod models;
pub mod near_miss;
pub mod orchestrator;
pub mod profile;
pub mod reranker;
pub mod retriever;
pub mod stores;
pub mod synonyms;
pub mod traits;

pub use assembler::{Evaluation, ResultAssembler};
pub use embeddings::{CharacterNgramEmbedder, Embedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{CapabilityError, IngestError, MatchError, StoreError};
pub use extractor::{LlmEndpointConfig, LlmProfileExtractor, ProfileExtractor, VocabularyExtractor};
pub use ingest::{
    discover_cv_files, ingest_folder_best_effort, store_documents, IngestionReport, SkippedFile,
};
pub use matcher::{ProfileMatcher, SkillAssessment};
pub use models::{
    Candidate, Document, EmbeddingMatch, FusionWeights, MatchOptions, MatchRequest, MatchResult,
    MatchTier, NearMiss, ScoredCandidate,
};
pub use orchestrator::MatchCoordinator;
pub use profile::{Profile, ProfileRole};
pub use reranker::{HttpCrossEncoder, PairScorer, Reranker, TokenOverlapScorer};
pub use retriever::Retriever;
pub use stores::{FileDocumentStore, FileIndexStore, QdrantIndexStore};
pub use synonyms::SynonymTable;
pub use traits::{DocumentStore, VectorIndex};
