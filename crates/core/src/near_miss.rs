use crate::matcher::SkillAssessment;
use crate::profile::Profile;
use crate::{Candidate, NearMiss};
use std::collections::HashSet;

const MAX_THEIR_SIGNALS: usize = 15;
const MAX_NAMED_MISSING: usize = 5;

pub(crate) fn domain_or<'a>(domain: &'a str, fallback: &'a str) -> &'a str {
    let trimmed = domain.trim();
    if trimmed.is_empty() {
        fallback
    } else {
        trimmed
    }
}

/// Explanation record for a candidate that failed the pass gate.
pub fn build_near_miss(
    candidate: &Candidate,
    profile: &Profile,
    requirement: &Profile,
    assessment: &SkillAssessment,
    final_score: f64,
) -> NearMiss {
    let their_domain = domain_or(&profile.domain, "Unknown domain").to_string();
    let required_domain = domain_or(&requirement.domain, "the required domain");

    let mut seen = HashSet::new();
    let their_signals = profile
        .skills
        .iter()
        .chain(&profile.keywords)
        .chain(&profile.certifications)
        .chain(&profile.implied)
        .filter(|signal| seen.insert(signal.to_lowercase()))
        .take(MAX_THEIR_SIGNALS)
        .cloned()
        .collect::<Vec<_>>();

    let total = assessment.matched.len() + assessment.missing.len();
    let missing_named = assessment
        .missing
        .iter()
        .take(MAX_NAMED_MISSING)
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");

    let mut suggestion = format!(
        "{} specializes in {}. They match {} out of {} required signals for {}.",
        candidate.candidate_name,
        their_domain,
        assessment.matched.len(),
        total,
        required_domain
    );
    if !missing_named.is_empty() {
        suggestion.push_str(&format!(" They are missing key skills: {missing_named}."));
    }

    NearMiss {
        document_id: candidate.document_id.clone(),
        filename: candidate.filename.clone(),
        candidate_name: candidate.candidate_name.clone(),
        final_score,
        skill_score: assessment.score,
        domain: their_domain,
        their_signals,
        required_signals: requirement.requirement_signals().into_iter().collect(),
        matched: assessment.matched.clone(),
        missing: assessment.missing.clone(),
        suggestion,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> Candidate {
        Candidate {
            document_id: "cv-7".to_string(),
            filename: "ana.txt".to_string(),
            candidate_name: "Ana".to_string(),
            raw_text: String::new(),
            embedding_score: 0.4,
            reranker_score: 0.2,
        }
    }

    #[test]
    fn suggestion_reports_coverage_and_names_five_missing() {
        let profile = Profile {
            skills: (0..20).map(|index| format!("skill {index}")).collect(),
            domain: "clinical medicine".to_string(),
            ..Profile::default()
        };
        let requirement = Profile {
            skills: vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into(), "f".into(), "g".into()],
            domain: "backend development".to_string(),
            ..Profile::default()
        };
        let assessment = SkillAssessment {
            score: 0.1429,
            matched: vec!["a".into()],
            missing: vec!["b".into(), "c".into(), "d".into(), "e".into(), "f".into(), "g".into()],
        };

        let near_miss = build_near_miss(&candidate(), &profile, &requirement, &assessment, 0.31);

        assert_eq!(near_miss.their_signals.len(), 15);
        assert_eq!(near_miss.required_signals.len(), 7);
        assert_eq!(near_miss.domain, "clinical medicine");
        assert_eq!(
            near_miss.suggestion,
            "Ana specializes in clinical medicine. They match 1 out of 7 required signals for \
             backend development. They are missing key skills: b, c, d, e, f."
        );
    }

    #[test]
    fn empty_profiles_fall_back_to_placeholders() {
        let near_miss = build_near_miss(
            &candidate(),
            &Profile::default(),
            &Profile::default(),
            &SkillAssessment::default(),
            0.2,
        );
        assert_eq!(near_miss.domain, "Unknown domain");
        assert!(near_miss.their_signals.is_empty());
        assert_eq!(
            near_miss.suggestion,
            "Ana specializes in Unknown domain. They match 0 out of 0 required signals for the required domain."
        );
    }
}
