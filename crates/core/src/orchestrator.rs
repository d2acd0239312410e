use crate::assembler::{Evaluation, ResultAssembler};
use crate::extractor::ProfileExtractor;
use crate::fusion::fuse;
use crate::matcher::ProfileMatcher;
use crate::profile::ProfileRole;
use crate::reranker::{PairScorer, Reranker};
use crate::retriever::Retriever;
use crate::synonyms::SynonymTable;
use crate::traits::{DocumentStore, VectorIndex};
use crate::{Candidate, MatchError, MatchOptions, MatchRequest, MatchResult};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Runs the three-judge cascade for one match request.
pub struct MatchCoordinator<D, V, S, P>
where
    D: DocumentStore,
    V: VectorIndex,
    S: PairScorer,
    P: ProfileExtractor,
{
    documents: D,
    retriever: Retriever<V>,
    reranker: Reranker<S>,
    extractor: P,
    synonyms: Arc<SynonymTable>,
    options: MatchOptions,
}

impl<D, V, S, P> MatchCoordinator<D, V, S, P>
where
    D: DocumentStore,
    V: VectorIndex,
    S: PairScorer,
    P: ProfileExtractor,
{
    pub fn new(documents: D, index: V, scorer: S, extractor: P) -> Self {
        Self {
            documents,
            retriever: Retriever::new(index),
            reranker: Reranker::new(scorer),
            extractor,
            synonyms: Arc::new(SynonymTable::builtin().clone()),
            options: MatchOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MatchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_synonyms(mut self, synonyms: Arc<SynonymTable>) -> Self {
        self.synonyms = synonyms;
        self
    }

    pub async fn run(&self, request: &MatchRequest) -> Result<MatchResult, MatchError> {
        if request.requirements.trim().is_empty() {
            return Err(MatchError::InvalidRequest(
                "requirements text cannot be empty".to_string(),
            ));
        }
        self.options.validate()?;

        let request_id = Uuid::new_v4();
        let scope = request.scope.as_str();
        let total_scanned = self
            .documents
            .count(scope)
            .await
            .map_err(MatchError::DocumentStore)?;
        if total_scanned == 0 {
            return Err(MatchError::EmptyPool {
                scope: scope.to_string(),
            });
        }
        info!(%request_id, scope, total_scanned, "match request started");

        let matches = self
            .retriever
            .retrieve(scope, &request.requirements, self.options.top_k_embedding)
            .await
            .map_err(MatchError::Retrieval)?;
        let assembler = ResultAssembler::new(&self.options);
        if matches.is_empty() {
            info!(%request_id, scope, "index returned no candidates");
            return Ok(assembler.no_candidates(request_id, total_scanned));
        }

        let ids = matches
            .iter()
            .map(|hit| hit.document_id.clone())
            .collect::<Vec<_>>();
        let stored = self
            .documents
            .get_by_ids(scope, &ids)
            .await
            .map_err(MatchError::DocumentStore)?;

        let candidates = matches
            .iter()
            .filter_map(|hit| match stored.get(&hit.document_id) {
                Some(document) => Some(Candidate::from_document(document, hit.score)),
                None => {
                    warn!(scope, document_id = %hit.document_id, "indexed document missing from store");
                    None
                }
            })
            .collect::<Vec<_>>();

        let (reranked, requirement) = tokio::join!(
            self.reranker.rerank(&request.requirements, candidates),
            self.extractor
                .extract(&request.requirements, ProfileRole::Requirement)
        );
        let reranked = reranked.map_err(MatchError::Rerank)?;
        info!(
            %request_id,
            domain = %requirement.domain,
            required_signals = requirement.requirement_signals().len(),
            "requirement profile extracted"
        );

        let matcher = ProfileMatcher::new(&self.synonyms);
        let mut evaluations = Vec::with_capacity(reranked.len());
        for candidate in reranked {
            let profile = self
                .extractor
                .extract(&candidate.raw_text, ProfileRole::Candidate)
                .await;
            let assessment = matcher.assess(&profile, &requirement);
            let final_score = fuse(
                &self.options.weights,
                candidate.embedding_score,
                candidate.reranker_score,
                assessment.score,
            );
            debug!(
                document_id = %candidate.document_id,
                embedding = candidate.embedding_score,
                reranker = candidate.reranker_score,
                skill = assessment.score,
                final_score,
                "candidate scored"
            );
            evaluations.push(Evaluation {
                candidate,
                profile,
                assessment,
                final_score,
            });
        }

        let result = assembler.assemble(request_id, total_scanned, &evaluations, &requirement);
        info!(
            %request_id,
            match_found = result.match_found,
            returned = result.top_candidates.len(),
            near_misses = result.near_misses.len(),
            "match request finished"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Profile;
    use crate::{CapabilityError, Document, EmbeddingMatch, MatchTier, StoreError};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeDocumentStore {
        documents: Vec<Document>,
    }

    impl FakeDocumentStore {
        fn with(ids: &[&str]) -> Self {
            Self {
                documents: ids
                    .iter()
                    .map(|id| Document {
                        document_id: id.to_string(),
                        scope: "job".to_string(),
                        filename: format!("{id}.txt"),
                        candidate_name: Some(id.to_uppercase()),
                        raw_text: format!("cv of {id}"),
                        skills: Vec::new(),
                        added_at: Utc::now(),
                    })
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl DocumentStore for FakeDocumentStore {
        async fn get_by_ids(
            &self,
            scope: &str,
            ids: &[String],
        ) -> Result<HashMap<String, Document>, StoreError> {
            Ok(self
                .documents
                .iter()
                .filter(|document| document.scope == scope && ids.contains(&document.document_id))
                .map(|document| (document.document_id.clone(), document.clone()))
                .collect())
        }

        async fn count(&self, scope: &str) -> Result<usize, StoreError> {
            Ok(self
                .documents
                .iter()
                .filter(|document| document.scope == scope)
                .count())
        }
    }

    #[derive(Default)]
    struct FakeVectorIndex {
        hits: Vec<EmbeddingMatch>,
        down: bool,
    }

    #[async_trait]
    impl VectorIndex for FakeVectorIndex {
        async fn add(&self, _scope: &str, _id: &str, _text: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn search(
            &self,
            _scope: &str,
            _text: &str,
            k: usize,
        ) -> Result<Vec<EmbeddingMatch>, StoreError> {
            if self.down {
                return Err(StoreError::Capability(CapabilityError::Unavailable {
                    service: "embedding".to_string(),
                    details: "connection refused".to_string(),
                }));
            }
            Ok(self.hits.iter().take(k).cloned().collect())
        }

        async fn delete(&self, _scope: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn len(&self, _scope: &str) -> Result<usize, StoreError> {
            Ok(self.hits.len())
        }
    }

    /// Scores each text from a table keyed by raw text; unknown texts score 0.
    #[derive(Default)]
    struct FakeScorer {
        scores: HashMap<String, f64>,
    }

    #[async_trait]
    impl PairScorer for FakeScorer {
        async fn score_batch(
            &self,
            _query: &str,
            texts: &[String],
        ) -> Result<Vec<f64>, CapabilityError> {
            Ok(texts
                .iter()
                .map(|text| self.scores.get(text).copied().unwrap_or(0.0))
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeExtractor {
        requirement: Profile,
        candidates: HashMap<String, Profile>,
    }

    #[async_trait]
    impl ProfileExtractor for FakeExtractor {
        async fn extract(&self, text: &str, role: ProfileRole) -> Profile {
            match role {
                ProfileRole::Requirement => self.requirement.clone(),
                ProfileRole::Candidate => self.candidates.get(text).cloned().unwrap_or_default(),
            }
        }
    }

    fn hit(id: &str, score: f64) -> EmbeddingMatch {
        EmbeddingMatch {
            document_id: id.to_string(),
            score,
        }
    }

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|item| item.to_string()).collect()
    }

    fn python_requirement() -> Profile {
        Profile {
            skills: list(&["Python", "Docker", "backend development"]),
            domain: "backend development".to_string(),
            ..Profile::default()
        }
    }

    #[tokio::test]
    async fn empty_query_is_rejected_before_the_pipeline() {
        let coordinator = MatchCoordinator::new(
            FakeDocumentStore::with(&["a"]),
            FakeVectorIndex::default(),
            FakeScorer::default(),
            FakeExtractor::default(),
        );
        let result = coordinator.run(&MatchRequest::new("   ", "job")).await;
        assert!(matches!(result, Err(MatchError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn empty_pool_is_rejected() {
        let coordinator = MatchCoordinator::new(
            FakeDocumentStore::default(),
            FakeVectorIndex::default(),
            FakeScorer::default(),
            FakeExtractor::default(),
        );
        let result = coordinator.run(&MatchRequest::new("python", "job")).await;
        assert!(matches!(result, Err(MatchError::EmptyPool { .. })));
    }

    #[tokio::test]
    async fn embedding_outage_surfaces_as_retrieval_failure() {
        let coordinator = MatchCoordinator::new(
            FakeDocumentStore::with(&["a"]),
            FakeVectorIndex {
                hits: Vec::new(),
                down: true,
            },
            FakeScorer::default(),
            FakeExtractor::default(),
        );
        let error = coordinator
            .run(&MatchRequest::new("python", "job"))
            .await
            .err();
        assert!(matches!(error, Some(MatchError::Retrieval(_))));
        assert!(error.is_some_and(|error| error.is_service_unavailable()));
    }

    #[tokio::test]
    async fn empty_index_yields_explained_empty_result() -> Result<(), MatchError> {
        let coordinator = MatchCoordinator::new(
            FakeDocumentStore::with(&["a"]),
            FakeVectorIndex::default(),
            FakeScorer::default(),
            FakeExtractor::default(),
        );
        let result = coordinator.run(&MatchRequest::new("python", "job")).await?;
        assert!(!result.match_found);
        assert!(result.top_candidates.is_empty());
        assert!(result.explanation.is_some());
        assert_eq!(result.total_scanned, 1);
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_hits_are_scored_once() -> Result<(), MatchError> {
        let mut candidates = HashMap::new();
        candidates.insert(
            "cv of a".to_string(),
            Profile {
                skills: list(&["Python", "FastAPI", "Docker"]),
                domain: "backend development".to_string(),
                ..Profile::default()
            },
        );
        let coordinator = MatchCoordinator::new(
            FakeDocumentStore::with(&["a", "b"]),
            FakeVectorIndex {
                hits: vec![hit("a", 0.8), hit("a", 0.7), hit("b", 0.6)],
                down: false,
            },
            FakeScorer::default(),
            FakeExtractor {
                requirement: python_requirement(),
                candidates,
            },
        );

        let result = coordinator
            .run(&MatchRequest::new("Python backend developer with Docker experience", "job"))
            .await?;
        let mut seen = result
            .top_candidates
            .iter()
            .map(|candidate| candidate.document_id.clone())
            .collect::<Vec<_>>();
        seen.extend(result.near_misses.iter().map(|near_miss| near_miss.document_id.clone()));
        seen.sort();
        seen.dedup();
        assert_eq!(seen, vec!["a".to_string(), "b".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn python_backend_candidate_is_at_least_partial() -> Result<(), MatchError> {
        let mut candidates = HashMap::new();
        candidates.insert(
            "cv of a".to_string(),
            Profile {
                skills: list(&["Python", "FastAPI", "Docker"]),
                domain: "backend development".to_string(),
                ..Profile::default()
            },
        );
        let mut scores = HashMap::new();
        scores.insert("cv of a".to_string(), 4.0);
        scores.insert("cv of b".to_string(), 1.0);

        let coordinator = MatchCoordinator::new(
            FakeDocumentStore::with(&["a", "b"]),
            FakeVectorIndex {
                hits: vec![hit("a", 0.6), hit("b", 0.5)],
                down: false,
            },
            FakeScorer { scores },
            FakeExtractor {
                requirement: python_requirement(),
                candidates,
            },
        );

        let result = coordinator
            .run(&MatchRequest::new("Python backend developer with Docker experience", "job"))
            .await?;

        assert!(result.match_found);
        let top = &result.top_candidates[0];
        assert_eq!(top.document_id, "a");
        assert!(top.matched_signals.contains(&"python".to_string()));
        assert!(top.matched_signals.contains(&"docker".to_string()));
        assert!(top.skill_score >= 0.2);
        assert!(top.tier >= MatchTier::Partial);
        for candidate in &result.top_candidates {
            for score in [
                candidate.final_score,
                candidate.embedding_score,
                candidate.reranker_score,
                candidate.skill_score,
            ] {
                assert!((0.0..=1.0).contains(&score));
            }
        }
        Ok(())
    }

    #[tokio::test]
    async fn garbled_requirement_fails_every_candidate() -> Result<(), MatchError> {
        let mut candidates = HashMap::new();
        candidates.insert(
            "cv of a".to_string(),
            Profile {
                skills: list(&["Python"]),
                ..Profile::default()
            },
        );
        let mut scores = HashMap::new();
        scores.insert("cv of a".to_string(), 9.0);

        let coordinator = MatchCoordinator::new(
            FakeDocumentStore::with(&["a", "b"]),
            FakeVectorIndex {
                hits: vec![hit("a", 0.99), hit("b", 0.98)],
                down: false,
            },
            FakeScorer { scores },
            FakeExtractor {
                requirement: Profile::default(),
                candidates,
            },
        );

        let result = coordinator.run(&MatchRequest::new("%%$#@!", "job")).await?;
        assert!(!result.match_found);
        assert!(result.top_candidates.is_empty());
        assert_eq!(result.near_misses.len(), 2);
        for near_miss in &result.near_misses {
            assert_eq!(near_miss.skill_score, 0.0);
            assert!(near_miss.matched.is_empty());
            assert!(near_miss.missing.is_empty());
        }
        Ok(())
    }

    #[tokio::test]
    async fn small_failing_pool_is_promoted_but_not_found() -> Result<(), MatchError> {
        let mut candidates = HashMap::new();
        for id in ["a", "b"] {
            candidates.insert(
                format!("cv of {id}"),
                Profile {
                    skills: list(&["Python"]),
                    ..Profile::default()
                },
            );
        }
        let requirement = Profile {
            skills: list(&["Python", "Kotlin", "Swift", "Objective-C", "Gradle"]),
            ..Profile::default()
        };

        let coordinator = MatchCoordinator::new(
            FakeDocumentStore::with(&["a", "b"]),
            FakeVectorIndex {
                hits: vec![hit("a", 0.3), hit("b", 0.2)],
                down: false,
            },
            FakeScorer::default(),
            FakeExtractor {
                requirement,
                candidates,
            },
        );

        let result = coordinator.run(&MatchRequest::new("mobile engineer", "job")).await?;
        assert!(!result.match_found);
        assert_eq!(result.top_candidates.len(), 2);
        assert!(result
            .top_candidates
            .iter()
            .all(|candidate| candidate.promoted && candidate.tier == MatchTier::Weak));
        assert!(result.explanation.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn invalid_options_are_rejected() {
        let mut options = MatchOptions::default();
        options.weights.skill = 0.9;
        let coordinator = MatchCoordinator::new(
            FakeDocumentStore::with(&["a"]),
            FakeVectorIndex::default(),
            FakeScorer::default(),
            FakeExtractor::default(),
        )
        .with_options(options);
        let result = coordinator.run(&MatchRequest::new("python", "job")).await;
        assert!(matches!(result, Err(MatchError::InvalidOptions(_))));
    }
}
