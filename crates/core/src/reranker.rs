use crate::embeddings::service_url;
use crate::models::{clamp_unit, round4};
use crate::{Candidate, CapabilityError};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info};
use url::Url;

/// Pairwise (query, document) relevance. One score per text, in input order.
#[async_trait]
pub trait PairScorer: Send + Sync {
    async fn score_batch(&self, query: &str, texts: &[String]) -> Result<Vec<f64>, CapabilityError>;
}

#[async_trait]
impl<T: PairScorer + ?Sized> PairScorer for Box<T> {
    async fn score_batch(&self, query: &str, texts: &[String]) -> Result<Vec<f64>, CapabilityError> {
        (**self).score_batch(query, texts).await
    }
}

/// Offline scorer: share of query tokens present in the document.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenOverlapScorer;

#[async_trait]
impl PairScorer for TokenOverlapScorer {
    async fn score_batch(&self, query: &str, texts: &[String]) -> Result<Vec<f64>, CapabilityError> {
        let query_tokens = tokens(query);
        Ok(texts
            .iter()
            .map(|text| {
                if query_tokens.is_empty() {
                    return 0.0;
                }
                let document_tokens = tokens(text);
                let shared = query_tokens.intersection(&document_tokens).count();
                shared as f64 / query_tokens.len() as f64
            })
            .collect())
    }
}

fn tokens(text: &str) -> HashSet<String> {
    text.split(|character: char| !character.is_alphanumeric() && character != '+' && character != '#')
        .filter(|token| token.chars().count() > 1)
        .map(str::to_lowercase)
        .collect()
}

#[derive(Debug, Deserialize)]
struct RerankHit {
    index: usize,
    score: f64,
}

/// Client for a text-embeddings-inference style `/rerank` endpoint serving a cross-encoder.
pub struct HttpCrossEncoder {
    endpoint: Url,
    client: Client,
}

impl HttpCrossEncoder {
    pub fn new(endpoint: &str) -> Result<Self, CapabilityError> {
        Ok(Self {
            endpoint: service_url(endpoint, "rerank")?,
            client: Client::new(),
        })
    }
}

#[async_trait]
impl PairScorer for HttpCrossEncoder {
    async fn score_batch(&self, query: &str, texts: &[String]) -> Result<Vec<f64>, CapabilityError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&json!({
                "query": query,
                "texts": texts,
                "raw_scores": true,
                "truncate": true,
            }))
            .send()
            .await
            .map_err(|error| CapabilityError::Unavailable {
                service: "reranker".to_string(),
                details: error.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CapabilityError::Unavailable {
                service: "reranker".to_string(),
                details: response.status().to_string(),
            });
        }

        let hits: Vec<RerankHit> = response.json().await?;
        scores_in_input_order(hits, texts.len())
    }
}

fn scores_in_input_order(hits: Vec<RerankHit>, expected: usize) -> Result<Vec<f64>, CapabilityError> {
    let mut scores = vec![None; expected];
    for hit in hits {
        match scores.get_mut(hit.index) {
            Some(slot) => *slot = Some(hit.score),
            None => {
                return Err(CapabilityError::BackendResponse {
                    backend: "reranker".to_string(),
                    details: format!("index {} out of range for {expected} texts", hit.index),
                })
            }
        }
    }
    scores
        .into_iter()
        .enumerate()
        .map(|(position, score)| {
            score.ok_or_else(|| CapabilityError::BackendResponse {
                backend: "reranker".to_string(),
                details: format!("no score returned for text {position}"),
            })
        })
        .collect()
}

/// Maps a batch of raw scores onto [0, 1].
///
/// A single score becomes 1.0. Otherwise min-max scaling over the finite scores is used;
/// when every score is equal the range is taken as 1.0, which maps the whole batch to 0.0.
/// Non-finite raw scores map to 0.0.
pub fn normalize_scores(raw: &[f64]) -> Vec<f64> {
    match raw {
        [] => Vec::new(),
        [single] => vec![if single.is_finite() { 1.0 } else { 0.0 }],
        _ => {
            let finite = raw.iter().copied().filter(|score| score.is_finite());
            let min = finite.clone().fold(f64::INFINITY, f64::min);
            let max = finite.fold(f64::NEG_INFINITY, f64::max);
            let range = if max > min { max - min } else { 1.0 };
            raw.iter()
                .map(|score| {
                    if score.is_finite() {
                        clamp_unit(round4((score - min) / range))
                    } else {
                        0.0
                    }
                })
                .collect()
        }
    }
}

/// Judge 2: cross-encoder reranking of retrieved candidates.
pub struct Reranker<S> {
    scorer: S,
}

impl<S: PairScorer> Reranker<S> {
    pub fn new(scorer: S) -> Self {
        Self { scorer }
    }

    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<Candidate>,
    ) -> Result<Vec<Candidate>, CapabilityError> {
        if candidates.is_empty() {
            return Ok(candidates);
        }

        let texts = candidates
            .iter()
            .map(|candidate| candidate.raw_text.clone())
            .collect::<Vec<_>>();
        let raw = self.scorer.score_batch(query, &texts).await?;
        if raw.len() != candidates.len() {
            return Err(CapabilityError::BackendResponse {
                backend: "reranker".to_string(),
                details: format!("{} scores for {} candidates", raw.len(), candidates.len()),
            });
        }

        for (candidate, score) in candidates.iter_mut().zip(normalize_scores(&raw)) {
            candidate.reranker_score = score;
            debug!(
                document_id = %candidate.document_id,
                reranker_score = score,
                "reranked candidate"
            );
        }

        candidates.sort_by(|left, right| right.reranker_score.total_cmp(&left.reranker_score));
        info!(count = candidates.len(), "reranking finished");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: &str, text: &str) -> Candidate {
        Candidate {
            document_id: id.to_string(),
            filename: format!("{id}.txt"),
            candidate_name: id.to_string(),
            raw_text: text.to_string(),
            embedding_score: 0.5,
            reranker_score: 0.0,
        }
    }

    struct FixedScorer(Vec<f64>);

    #[async_trait]
    impl PairScorer for FixedScorer {
        async fn score_batch(&self, _query: &str, _texts: &[String]) -> Result<Vec<f64>, CapabilityError> {
            Ok(self.0.clone())
        }
    }

    struct PanickingScorer;

    #[async_trait]
    impl PairScorer for PanickingScorer {
        async fn score_batch(&self, _query: &str, _texts: &[String]) -> Result<Vec<f64>, CapabilityError> {
            panic!("scorer must not be called for an empty batch");
        }
    }

    #[test]
    fn single_score_normalizes_to_one() {
        assert_eq!(normalize_scores(&[-7.3]), vec![1.0]);
    }

    #[test]
    fn equal_scores_normalize_to_zero() {
        let normalized = normalize_scores(&[2.5, 2.5, 2.5]);
        assert_eq!(normalized, vec![0.0, 0.0, 0.0]);
        assert!(normalized.iter().all(|score| !score.is_nan()));
    }

    #[test]
    fn non_finite_scores_stay_in_unit_interval() {
        assert_eq!(normalize_scores(&[f64::NAN, 0.2, 0.8]), vec![0.0, 0.0, 1.0]);
        assert_eq!(normalize_scores(&[f64::INFINITY, 0.2, 0.8]), vec![0.0, 0.0, 1.0]);
        assert_eq!(normalize_scores(&[f64::NEG_INFINITY, f64::NAN]), vec![0.0, 0.0]);
        assert_eq!(normalize_scores(&[f64::NAN]), vec![0.0]);
        for batch in [[f64::NAN, 1.0, -3.0], [f64::INFINITY, f64::NEG_INFINITY, 2.0]] {
            assert!(normalize_scores(&batch)
                .iter()
                .all(|score| (0.0..=1.0).contains(score)));
        }
    }

    #[test]
    fn min_max_scaling_spans_unit_interval() {
        assert_eq!(normalize_scores(&[-2.0, 0.0, 2.0]), vec![0.0, 0.5, 1.0]);
    }

    #[tokio::test]
    async fn empty_batch_skips_the_scorer() -> Result<(), CapabilityError> {
        let reranked = Reranker::new(PanickingScorer).rerank("query", Vec::new()).await?;
        assert!(reranked.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn candidates_are_resorted_by_reranker_score() -> Result<(), CapabilityError> {
        let reranker = Reranker::new(FixedScorer(vec![-1.0, 3.0, 1.0]));
        let reranked = reranker
            .rerank(
                "query",
                vec![candidate("a", "x"), candidate("b", "y"), candidate("c", "z")],
            )
            .await?;
        let ids = reranked
            .iter()
            .map(|candidate| candidate.document_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(reranked[0].reranker_score, 1.0);
        assert_eq!(reranked[1].reranker_score, 0.5);
        assert_eq!(reranked[2].reranker_score, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn score_count_mismatch_is_a_backend_error() {
        let reranker = Reranker::new(FixedScorer(vec![0.2]));
        let result = reranker
            .rerank("query", vec![candidate("a", "x"), candidate("b", "y")])
            .await;
        assert!(matches!(result, Err(CapabilityError::BackendResponse { .. })));
    }

    #[tokio::test]
    async fn token_overlap_prefers_matching_text() -> Result<(), CapabilityError> {
        let scores = TokenOverlapScorer
            .score_batch(
                "Python Docker",
                &["python and docker".to_string(), "nursing".to_string()],
            )
            .await?;
        assert_eq!(scores, vec![1.0, 0.0]);
        Ok(())
    }

    #[test]
    fn rerank_hits_are_reordered_by_index() -> Result<(), CapabilityError> {
        let hits = vec![
            RerankHit { index: 1, score: 0.9 },
            RerankHit { index: 0, score: 0.1 },
        ];
        assert_eq!(scores_in_input_order(hits, 2)?, vec![0.1, 0.9]);
        Ok(())
    }

    #[test]
    fn missing_rerank_hit_is_rejected() {
        let hits = vec![RerankHit { index: 0, score: 0.1 }];
        assert!(scores_in_input_order(hits, 2).is_err());
    }

    #[tokio::test]
    async fn cross_encoder_posts_pairs_and_restores_input_order() -> Result<(), CapabilityError> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rerank")
            .match_body(mockito::Matcher::PartialJson(json!({
                "query": "python",
                "texts": ["a", "b"],
                "raw_scores": true,
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"index": 1, "score": 4.2}, {"index": 0, "score": -1.5}]"#)
            .create_async()
            .await;

        let scorer = HttpCrossEncoder::new(&server.url())?;
        let scores = scorer
            .score_batch("python", &["a".to_string(), "b".to_string()])
            .await?;

        mock.assert_async().await;
        assert_eq!(scores, vec![-1.5, 4.2]);
        Ok(())
    }

    #[tokio::test]
    async fn cross_encoder_response_missing_an_index_is_rejected() -> Result<(), CapabilityError> {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/rerank")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"index": 0, "score": 0.3}]"#)
            .create_async()
            .await;

        let scorer = HttpCrossEncoder::new(&server.url())?;
        let result = scorer
            .score_batch("python", &["a".to_string(), "b".to_string()])
            .await;
        assert!(matches!(result, Err(CapabilityError::BackendResponse { .. })));
        Ok(())
    }
}
