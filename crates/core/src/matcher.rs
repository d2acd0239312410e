use crate::models::round4;
use crate::profile::{normalize_signal, Profile};
use crate::synonyms::SynonymTable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

pub const DOMAIN_BONUS: f64 = 0.20;
const WORD_OVERLAP_RATIO: f64 = 0.5;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SkillAssessment {
    pub score: f64,
    pub matched: Vec<String>,
    pub missing: Vec<String>,
}

/// Judge 3: overlap between a candidate profile and a requirement profile.
///
/// Matching favours recall: a requirement signal counts as covered when any of exact
/// equality, substring containment, word overlap or a synonym link holds.
#[derive(Debug, Clone, Copy)]
pub struct ProfileMatcher<'a> {
    synonyms: &'a SynonymTable,
}

impl Default for ProfileMatcher<'static> {
    fn default() -> Self {
        Self::new(SynonymTable::builtin())
    }
}

impl<'a> ProfileMatcher<'a> {
    pub fn new(synonyms: &'a SynonymTable) -> Self {
        Self { synonyms }
    }

    pub fn assess(&self, candidate: &Profile, requirement: &Profile) -> SkillAssessment {
        let required = requirement.requirement_signals();
        if required.is_empty() {
            return SkillAssessment::default();
        }

        let held = candidate.candidate_signals();
        let (matched, missing): (Vec<String>, Vec<String>) = required
            .iter()
            .cloned()
            .partition(|signal| self.signal_matches(signal, &held));

        let base = matched.len() as f64 / required.len() as f64;
        let bonus = if domains_align(&candidate.domain, &requirement.domain) {
            DOMAIN_BONUS
        } else {
            0.0
        };

        SkillAssessment {
            score: round4((base + bonus).min(1.0)),
            matched,
            missing,
        }
    }

    fn signal_matches(&self, signal: &str, held: &BTreeSet<String>) -> bool {
        exact_match(signal, held)
            || substring_match(signal, held)
            || word_overlap_match(signal, held)
            || self.synonyms.links(signal, held)
    }
}

fn exact_match(signal: &str, held: &BTreeSet<String>) -> bool {
    held.contains(signal)
}

fn substring_match(signal: &str, held: &BTreeSet<String>) -> bool {
    held.iter()
        .any(|item| item.contains(signal) || signal.contains(item.as_str()))
}

// Only multi-word signals; single words are covered by the substring check.
fn word_overlap_match(signal: &str, held: &BTreeSet<String>) -> bool {
    let words = signal.split_whitespace().collect::<HashSet<_>>();
    if words.len() <= 1 {
        return false;
    }
    held.iter().any(|item| {
        let shared = item
            .split_whitespace()
            .filter(|word| words.contains(word))
            .collect::<HashSet<_>>()
            .len();
        shared as f64 / words.len() as f64 >= WORD_OVERLAP_RATIO
    })
}

pub fn domains_align(left: &str, right: &str) -> bool {
    let left = normalize_signal(left);
    let right = normalize_signal(right);
    if left.is_empty() || right.is_empty() {
        return false;
    }
    let left_words = left.split_whitespace().collect::<HashSet<_>>();
    right.split_whitespace().any(|word| left_words.contains(word))
        || left.contains(&right)
        || right.contains(&left)
}
