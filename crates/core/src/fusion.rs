use crate::models::{clamp_unit, round4, FusionWeights, MatchOptions, MatchTier};

/// Weighted sum of the three judge scores, rounded to four decimals and kept in [0, 1].
pub fn fuse(weights: &FusionWeights, embedding: f64, reranker: f64, skill: f64) -> f64 {
    let combined = weights.embedding * clamp_unit(embedding)
        + weights.reranker * clamp_unit(reranker)
        + weights.skill * clamp_unit(skill);
    clamp_unit(round4(combined))
}

pub fn tier(options: &MatchOptions, final_score: f64) -> MatchTier {
    if final_score >= options.strong_tier {
        MatchTier::Strong
    } else if final_score >= options.partial_tier {
        MatchTier::Partial
    } else {
        MatchTier::Weak
    }
}

/// A zero skill score never passes: embedding and reranker agreement alone is not evidence.
pub fn passes(options: &MatchOptions, skill_score: f64, final_score: f64) -> bool {
    skill_score > 0.0 && final_score >= options.minimum_threshold
}
