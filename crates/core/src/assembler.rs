use crate::fusion::{passes, tier};
use crate::matcher::SkillAssessment;
use crate::near_miss::{build_near_miss, domain_or};
use crate::profile::Profile;
use crate::{Candidate, MatchOptions, MatchResult, MatchTier, NearMiss, ScoredCandidate};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

const MAX_NAMED_CANDIDATES: usize = 3;
const MAX_COMMON_MISSING: usize = 5;
const MAX_EXPLAINED_SKILLS: usize = 6;

/// One candidate after all three judges have run.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub candidate: Candidate,
    pub profile: Profile,
    pub assessment: SkillAssessment,
    pub final_score: f64,
}

pub struct ResultAssembler<'a> {
    options: &'a MatchOptions,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(options: &'a MatchOptions) -> Self {
        Self { options }
    }

    /// Result for a scope whose index returned nothing for the query.
    pub fn no_candidates(&self, request_id: Uuid, total_scanned: usize) -> MatchResult {
        MatchResult {
            request_id,
            total_scanned,
            top_candidates: Vec::new(),
            match_found: false,
            explanation: Some("No candidates found for these requirements.".to_string()),
            near_misses: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    pub fn assemble(
        &self,
        request_id: Uuid,
        total_scanned: usize,
        evaluations: &[Evaluation],
        requirement: &Profile,
    ) -> MatchResult {
        let mut passing = Vec::new();
        let mut failing = Vec::new();

        for evaluation in evaluations {
            let skill_score = evaluation.assessment.score;
            if passes(self.options, skill_score, evaluation.final_score) {
                passing.push(self.scored(evaluation));
            } else {
                failing.push(build_near_miss(
                    &evaluation.candidate,
                    &evaluation.profile,
                    requirement,
                    &evaluation.assessment,
                    evaluation.final_score,
                ));
            }
        }

        passing.sort_by(|left, right| right.final_score.total_cmp(&left.final_score));
        failing.sort_by(|left, right| right.final_score.total_cmp(&left.final_score));

        let strict = passing
            .iter()
            .take(self.options.top_k_final)
            .cloned()
            .collect::<Vec<_>>();

        let shortfall = self.options.minimum_results.saturating_sub(passing.len());
        let promoted = failing
            .iter()
            .filter(|near_miss| near_miss.skill_score > 0.0)
            .take(shortfall)
            .map(promote)
            .collect::<Vec<_>>();
        if !promoted.is_empty() {
            info!(
                promoted = promoted.len(),
                passing = passing.len(),
                "filling minimum result guarantee with near misses"
            );
        }

        let mut top_candidates = passing;
        top_candidates.extend(promoted);
        top_candidates.truncate(self.options.top_k_final);

        let near_misses = failing
            .into_iter()
            .take(self.options.near_miss_limit)
            .collect::<Vec<_>>();

        let common_missing = most_common_missing(evaluations, MAX_COMMON_MISSING);
        let match_found = !strict.is_empty();
        let explanation = (!match_found).then(|| explain(requirement, near_misses.len()));
        let suggestions = self.suggestions(
            &strict,
            &near_misses,
            requirement,
            total_scanned,
            &common_missing,
        );

        MatchResult {
            request_id,
            total_scanned,
            top_candidates,
            match_found,
            explanation,
            near_misses,
            suggestions,
        }
    }

    fn scored(&self, evaluation: &Evaluation) -> ScoredCandidate {
        ScoredCandidate {
            document_id: evaluation.candidate.document_id.clone(),
            filename: evaluation.candidate.filename.clone(),
            candidate_name: evaluation.candidate.candidate_name.clone(),
            final_score: evaluation.final_score,
            embedding_score: evaluation.candidate.embedding_score,
            reranker_score: evaluation.candidate.reranker_score,
            skill_score: evaluation.assessment.score,
            tier: tier(self.options, evaluation.final_score),
            matched_signals: evaluation.assessment.matched.clone(),
            missing_signals: evaluation.assessment.missing.clone(),
            promoted: false,
        }
    }

    fn suggestions(
        &self,
        strict: &[ScoredCandidate],
        near_misses: &[NearMiss],
        requirement: &Profile,
        total_scanned: usize,
        common_missing: &[String],
    ) -> Vec<String> {
        let domain = domain_or(&requirement.domain, "the required domain");
        let mut suggestions = Vec::new();

        if strict.is_empty() {
            suggestions.push(format!(
                "No matching candidates found for '{domain}'. Your current CV pool does not cover this domain."
            ));
            if !common_missing.is_empty() {
                suggestions.push(format!(
                    "To fill this requirement you need candidates with: {}. Consider sourcing CVs specifically for {domain} profiles.",
                    common_missing.join(", ")
                ));
            }
        } else {
            let strong = names_in_tier(strict, MatchTier::Strong);
            if !strong.is_empty() {
                suggestions.push(format!(
                    "You have {} strong match(es). We recommend prioritizing: {}.",
                    strong.len(),
                    first_names(&strong)
                ));
            }
            let partial = names_in_tier(strict, MatchTier::Partial);
            if !partial.is_empty() {
                suggestions.push(format!(
                    "You have {} partial match(es). These candidates could be suitable with minor upskilling: {}.",
                    partial.len(),
                    first_names(&partial)
                ));
            }
            if !common_missing.is_empty() {
                suggestions.push(format!(
                    "The most common missing skills across your candidates are: {}. Consider filtering for CVs that include these skills.",
                    common_missing.join(", ")
                ));
            }
            if strict
                .iter()
                .all(|candidate| candidate.skill_score < self.options.low_coverage)
            {
                suggestions.push(format!(
                    "All matched candidates have skill coverage below {:.0}%. Consider reviewing whether every requirement is strictly necessary, or expand your CV pool for better results.",
                    self.options.low_coverage * 100.0
                ));
            }
        }

        if total_scanned < self.options.low_pool_warning {
            suggestions.push(format!(
                "Your CV pool only has {total_scanned} candidate(s). Upload more CVs to improve matching accuracy and coverage."
            ));
        }

        if strict.is_empty() {
            if let Some(closest) = near_misses.first().filter(|closest| !closest.matched.is_empty()) {
                suggestions.push(format!(
                    "{} is your closest candidate. They already have: {}. With training on {}, they could become viable for future {domain} requirements.",
                    closest.candidate_name,
                    closest.matched.iter().take(4).cloned().collect::<Vec<_>>().join(", "),
                    closest.missing.iter().take(3).cloned().collect::<Vec<_>>().join(", "),
                ));
            }
        }

        suggestions
    }
}

/// Promoted entries keep their identity and signal lists but carry zeroed judge
/// scores, so they can never be mistaken for a genuine match.
fn promote(near_miss: &NearMiss) -> ScoredCandidate {
    ScoredCandidate {
        document_id: near_miss.document_id.clone(),
        filename: near_miss.filename.clone(),
        candidate_name: near_miss.candidate_name.clone(),
        final_score: 0.0,
        embedding_score: 0.0,
        reranker_score: 0.0,
        skill_score: 0.0,
        tier: MatchTier::Weak,
        matched_signals: near_miss.matched.clone(),
        missing_signals: near_miss.missing.clone(),
        promoted: true,
    }
}

fn explain(requirement: &Profile, near_miss_count: usize) -> String {
    let domain = domain_or(&requirement.domain, "the required domain");
    let skills = if requirement.skills.is_empty() {
        requirement
            .requirement_signals()
            .into_iter()
            .take(MAX_EXPLAINED_SKILLS)
            .collect::<Vec<_>>()
    } else {
        requirement
            .skills
            .iter()
            .take(MAX_EXPLAINED_SKILLS)
            .cloned()
            .collect::<Vec<_>>()
    };

    format!(
        "No candidates in the pool match the requirements for '{domain}'. \
         The requirement calls for expertise in: {}. \
         The {near_miss_count} candidate(s) listed as near misses come from other domains or lack the core required skills. \
         Consider adding CVs from professionals in {domain}.",
        skills.join(", ")
    )
}

fn names_in_tier(candidates: &[ScoredCandidate], wanted: MatchTier) -> Vec<&str> {
    candidates
        .iter()
        .filter(|candidate| candidate.tier == wanted)
        .map(|candidate| candidate.candidate_name.as_str())
        .collect()
}

fn first_names(names: &[&str]) -> String {
    names
        .iter()
        .take(MAX_NAMED_CANDIDATES)
        .copied()
        .collect::<Vec<_>>()
        .join(", ")
}

/// Missing signals ranked by how many candidates lack them; ties keep first-seen order.
pub fn most_common_missing(evaluations: &[Evaluation], limit: usize) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();

    for signal in evaluations
        .iter()
        .flat_map(|evaluation| evaluation.assessment.missing.iter())
    {
        match positions.get(signal) {
            Some(&position) => counts[position].1 += 1,
            None => {
                positions.insert(signal.clone(), counts.len());
                counts.push((signal.clone(), 1));
            }
        }
    }

    counts.sort_by(|left, right| right.1.cmp(&left.1));
    counts
        .into_iter()
        .take(limit)
        .map(|(signal, _)| signal)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluation(id: &str, final_score: f64, skill: f64, missing: &[&str]) -> Evaluation {
        Evaluation {
            candidate: Candidate {
                document_id: id.to_string(),
                filename: format!("{id}.txt"),
                candidate_name: id.to_uppercase(),
                raw_text: String::new(),
                embedding_score: 0.5,
                reranker_score: 0.5,
            },
            profile: Profile::default(),
            assessment: SkillAssessment {
                score: skill,
                matched: if skill > 0.0 { vec!["python".to_string()] } else { Vec::new() },
                missing: missing.iter().map(|item| item.to_string()).collect(),
            },
            final_score,
        }
    }

    fn requirement() -> Profile {
        Profile {
            skills: vec!["Python".to_string(), "Docker".to_string()],
            domain: "backend development".to_string(),
            ..Profile::default()
        }
    }

    #[test]
    fn passing_candidates_are_sorted_and_tiered() {
        let options = MatchOptions::default();
        let evaluations = vec![
            evaluation("a", 0.58, 0.5, &[]),
            evaluation("b", 0.81, 0.9, &[]),
            evaluation("c", 0.70, 0.4, &["docker"]),
        ];
        let result = ResultAssembler::new(&options).assemble(Uuid::nil(), 10, &evaluations, &requirement());

        let ids = result
            .top_candidates
            .iter()
            .map(|candidate| candidate.document_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(result.top_candidates[0].tier, MatchTier::Strong);
        assert_eq!(result.top_candidates[2].tier, MatchTier::Partial);
        assert!(result.match_found);
        assert!(result.explanation.is_none());
        assert!(result.near_misses.is_empty());
    }

    #[test]
    fn zero_skill_never_reaches_top_candidates() {
        let options = MatchOptions::default();
        let evaluations = vec![
            evaluation("high", 0.95, 0.0, &["python"]),
            evaluation("ok", 0.60, 0.3, &[]),
        ];
        let result = ResultAssembler::new(&options).assemble(Uuid::nil(), 10, &evaluations, &requirement());

        assert!(result
            .top_candidates
            .iter()
            .all(|candidate| candidate.document_id != "high"));
        assert_eq!(result.near_misses.len(), 1);
        assert_eq!(result.near_misses[0].document_id, "high");
    }

    #[test]
    fn two_failing_candidates_are_promoted_without_claiming_a_match() {
        let options = MatchOptions::default();
        let evaluations = vec![
            evaluation("low", 0.2, 0.1, &["docker"]),
            evaluation("higher", 0.3, 0.2, &["docker"]),
        ];
        let result = ResultAssembler::new(&options).assemble(Uuid::nil(), 2, &evaluations, &requirement());

        assert_eq!(result.top_candidates.len(), 2);
        assert_eq!(result.top_candidates[0].document_id, "higher");
        for promoted in &result.top_candidates {
            assert!(promoted.promoted);
            assert_eq!(promoted.tier, MatchTier::Weak);
            assert_eq!(promoted.final_score, 0.0);
            assert_eq!(promoted.embedding_score, 0.0);
            assert_eq!(promoted.reranker_score, 0.0);
            assert_eq!(promoted.skill_score, 0.0);
            assert_eq!(promoted.matched_signals, vec!["python".to_string()]);
        }
        assert!(!result.match_found);
        assert_eq!(result.strict_matches().count(), 0);
        assert!(result.explanation.is_some());
    }

    #[test]
    fn promotion_fills_up_to_three_behind_genuine_matches() {
        let options = MatchOptions::default();
        let evaluations = vec![
            evaluation("pass", 0.7, 0.6, &[]),
            evaluation("nm1", 0.5, 0.3, &["docker"]),
            evaluation("nm2", 0.45, 0.2, &["docker"]),
            evaluation("nm3", 0.44, 0.2, &["docker"]),
            evaluation("zero", 0.52, 0.0, &["python", "docker"]),
        ];
        let result = ResultAssembler::new(&options).assemble(Uuid::nil(), 5, &evaluations, &requirement());

        let ids = result
            .top_candidates
            .iter()
            .map(|candidate| candidate.document_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(ids, vec!["pass", "nm1", "nm2"]);
        assert!(result.match_found);
        assert_eq!(result.strict_matches().count(), 1);
        assert_eq!(result.near_misses.len(), 4);
        assert_eq!(result.near_misses[0].document_id, "zero");
    }

    #[test]
    fn near_misses_are_capped_at_five() {
        let options = MatchOptions::default();
        let evaluations = (0..8)
            .map(|index| evaluation(&format!("c{index}"), 0.1 + index as f64 / 100.0, 0.1, &[]))
            .collect::<Vec<_>>();
        let result = ResultAssembler::new(&options).assemble(Uuid::nil(), 8, &evaluations, &requirement());

        assert_eq!(result.near_misses.len(), 5);
        assert_eq!(result.near_misses[0].document_id, "c7");
        assert_eq!(result.top_candidates.len(), 3);
    }

    #[test]
    fn common_missing_orders_by_frequency_then_first_seen() {
        let evaluations = vec![
            evaluation("a", 0.1, 0.1, &["sql", "docker"]),
            evaluation("b", 0.1, 0.1, &["docker", "aws"]),
            evaluation("c", 0.1, 0.1, &["aws", "kubernetes"]),
        ];
        assert_eq!(
            most_common_missing(&evaluations, 3),
            vec!["docker".to_string(), "aws".to_string(), "sql".to_string()]
        );
    }

    #[test]
    fn no_match_suggestions_include_pool_warning_and_upskilling() {
        let options = MatchOptions::default();
        let evaluations = vec![evaluation("ana", 0.3, 0.25, &["docker", "kubernetes"])];
        let result = ResultAssembler::new(&options).assemble(Uuid::nil(), 1, &evaluations, &requirement());

        assert!(result.suggestions[0].starts_with("No matching candidates found for 'backend development'"));
        assert!(result
            .suggestions
            .iter()
            .any(|suggestion| suggestion.contains("only has 1 candidate(s)")));
        assert!(result
            .suggestions
            .iter()
            .any(|suggestion| suggestion.starts_with("ANA is your closest candidate")));
        let explanation = result.explanation.unwrap_or_default();
        assert!(explanation.contains("Python, Docker"));
    }

    #[test]
    fn low_coverage_warning_when_every_match_is_thin() {
        let options = MatchOptions::default();
        let evaluations = vec![evaluation("a", 0.7, 0.5, &["docker"])];
        let result = ResultAssembler::new(&options).assemble(Uuid::nil(), 12, &evaluations, &requirement());

        assert!(result
            .suggestions
            .iter()
            .any(|suggestion| suggestion.contains("below 60%")));
        assert!(result
            .suggestions
            .iter()
            .any(|suggestion| suggestion.starts_with("You have 1 strong match(es)")));
        assert!(!result
            .suggestions
            .iter()
            .any(|suggestion| suggestion.contains("Upload more CVs")));
    }
}
