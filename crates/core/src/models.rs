use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::MatchError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub document_id: String,
    pub scope: String,
    pub filename: String,
    pub candidate_name: Option<String>,
    pub raw_text: String,
    #[serde(default)]
    pub skills: Vec<String>,
    pub added_at: DateTime<Utc>,
}

impl Document {
    pub fn display_name(&self) -> &str {
        self.candidate_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.filename)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct MatchRequest {
    pub requirements: String,
    pub scope: String,
}

impl MatchRequest {
    pub fn new(requirements: impl Into<String>, scope: impl Into<String>) -> Self {
        Self {
            requirements: requirements.into(),
            scope: scope.into(),
        }
    }
}

/// Raw cosine similarity from the vector index, in [-1, 1].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingMatch {
    pub document_id: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub document_id: String,
    pub filename: String,
    pub candidate_name: String,
    pub raw_text: String,
    pub embedding_score: f64,
    pub reranker_score: f64,
}

impl Candidate {
    pub fn from_document(document: &Document, embedding_score: f64) -> Self {
        Self {
            document_id: document.document_id.clone(),
            filename: document.filename.clone(),
            candidate_name: document.display_name().to_string(),
            raw_text: document.raw_text.clone(),
            embedding_score: clamp_unit(embedding_score),
            reranker_score: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MatchTier {
    #[serde(rename = "Weak Match")]
    Weak,
    #[serde(rename = "Partial Match")]
    Partial,
    #[serde(rename = "Strong Match")]
    Strong,
}

impl fmt::Display for MatchTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MatchTier::Strong => "Strong Match",
            MatchTier::Partial => "Partial Match",
            MatchTier::Weak => "Weak Match",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredCandidate {
    pub document_id: String,
    pub filename: String,
    pub candidate_name: String,
    pub final_score: f64,
    pub embedding_score: f64,
    pub reranker_score: f64,
    pub skill_score: f64,
    pub tier: MatchTier,
    pub matched_signals: Vec<String>,
    pub missing_signals: Vec<String>,
    /// Set on near misses lifted into the list by the minimum-result guarantee.
    #[serde(default)]
    pub promoted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NearMiss {
    pub document_id: String,
    pub filename: String,
    pub candidate_name: String,
    pub final_score: f64,
    pub skill_score: f64,
    pub domain: String,
    pub their_signals: Vec<String>,
    pub required_signals: Vec<String>,
    pub matched: Vec<String>,
    pub missing: Vec<String>,
    pub suggestion: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchResult {
    pub request_id: Uuid,
    pub total_scanned: usize,
    pub top_candidates: Vec<ScoredCandidate>,
    pub match_found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub near_misses: Vec<NearMiss>,
    pub suggestions: Vec<String>,
}

impl MatchResult {
    pub fn strict_matches(&self) -> impl Iterator<Item = &ScoredCandidate> {
        self.top_candidates.iter().filter(|candidate| !candidate.promoted)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FusionWeights {
    pub embedding: f64,
    pub reranker: f64,
    pub skill: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            embedding: 0.30,
            reranker: 0.40,
            skill: 0.30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchOptions {
    pub top_k_embedding: usize,
    pub top_k_final: usize,
    pub weights: FusionWeights,
    pub minimum_threshold: f64,
    pub minimum_results: usize,
    pub near_miss_limit: usize,
    pub strong_tier: f64,
    pub partial_tier: f64,
    pub low_pool_warning: usize,
    pub low_coverage: f64,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            top_k_embedding: 20,
            top_k_final: 10,
            weights: FusionWeights::default(),
            minimum_threshold: 0.55,
            minimum_results: 3,
            near_miss_limit: 5,
            strong_tier: 0.65,
            partial_tier: 0.40,
            low_pool_warning: 5,
            low_coverage: 0.60,
        }
    }
}

impl MatchOptions {
    pub fn validate(&self) -> Result<(), MatchError> {
        let weights = [self.weights.embedding, self.weights.reranker, self.weights.skill];
        if weights.iter().any(|weight| !weight.is_finite() || *weight < 0.0) {
            return Err(MatchError::InvalidOptions(
                "fusion weights must be finite and non-negative".to_string(),
            ));
        }
        let total: f64 = weights.iter().sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(MatchError::InvalidOptions(format!(
                "fusion weights must sum to 1.0, got {total}"
            )));
        }
        if self.top_k_embedding == 0 || self.top_k_final == 0 {
            return Err(MatchError::InvalidOptions(
                "top_k_embedding and top_k_final must be positive".to_string(),
            ));
        }
        // Promoted entries score 0.0 and are Weak, so 0.0 must stay below the Partial bound.
        if !(self.partial_tier > 0.0 && self.partial_tier <= self.strong_tier && self.strong_tier <= 1.0) {
            return Err(MatchError::InvalidOptions(format!(
                "tier bounds must satisfy 0 < partial ({}) <= strong ({}) <= 1",
                self.partial_tier, self.strong_tier
            )));
        }
        if !(0.0..=1.0).contains(&self.minimum_threshold) {
            return Err(MatchError::InvalidOptions(format!(
                "minimum threshold {} is outside [0, 1]",
                self.minimum_threshold
            )));
        }
        Ok(())
    }
}

pub fn clamp_unit(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

pub fn round4(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}
