//! Reciprocal Rank Fusion algorithm for combining search results

use crate::retrieval::{Candidate, FusedResult};
use ahash::AHashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid RRF constant: k must be a non-negative number, got {0}")]
    InvalidK(f32),

    #[error("Invalid confidence scale: must be positive, got {0}")]
    InvalidScale(f32),
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// RRF K constant (typically 60)
    pub rrf_k: f32,

    /// Multiplier turning the summed RRF score into a confidence
    pub confidence_scale: f32,
}

impl FusionConfig {
    pub fn new(rrf_k: f32, confidence_scale: f32) -> Result<Self, FusionError> {
        if !(rrf_k >= 0.0 && rrf_k.is_finite()) {
            return Err(FusionError::InvalidK(rrf_k));
        }
        if !(confidence_scale > 0.0 && confidence_scale.is_finite()) {
            return Err(FusionError::InvalidScale(confidence_scale));
        }

        Ok(Self {
            rrf_k,
            confidence_scale,
        })
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            confidence_scale: 2.0,
        }
    }
}

/// Apply Reciprocal Rank Fusion to any number of ranked candidate lists
///
/// RRF formula: score(id) = sum over all lists of: 1 / (k + rank + 1)
///
/// Lists are processed left to right; ties on the fused score keep the order
/// in which ids were first seen across that concatenation, so identical input
/// always fuses to identical output.
///
/// # Returns
/// One `FusedResult` per distinct id, sorted by fused score descending, with
/// `confidence = min(score * confidence_scale, 1)`
pub fn reciprocal_rank_fusion(
    result_sets: Vec<Vec<Candidate>>,
    config: &FusionConfig,
) -> Vec<FusedResult> {
    let mut positions: AHashMap<String, usize> = AHashMap::new();
    let mut entries: Vec<(FusedResult, f32)> = Vec::new();

    for results in result_sets {
        for (rank, candidate) in results.into_iter().enumerate() {
            let rrf_score = 1.0 / (config.rrf_k + (rank as f32) + 1.0);

            match positions.get(&candidate.id) {
                Some(&pos) => {
                    let (fused, score) = &mut entries[pos];
                    *score += rrf_score;
                    if !fused.matched_by.contains(&candidate.strategy) {
                        fused.matched_by.push(candidate.strategy);
                    }
                    fused.candidate.absorb(&candidate);
                }
                None => {
                    positions.insert(candidate.id.clone(), entries.len());
                    let matched_by = vec![candidate.strategy];
                    entries.push((
                        FusedResult {
                            candidate,
                            confidence: 0.0,
                            matched_by,
                        },
                        rrf_score,
                    ));
                }
            }
        }
    }

    // Stable sort: equal scores stay in first-seen order
    entries.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    entries
        .into_iter()
        .map(|(mut fused, score)| {
            fused.confidence = (score * config.confidence_scale).clamp(0.0, 1.0);
            fused
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::StrategyKind;
    use pretty_assertions::assert_eq;

    fn list(ids: &[&str], strategy: StrategyKind) -> Vec<Candidate> {
        ids.iter()
            .map(|id| Candidate::new(*id, format!("content {}", id), 0.5, strategy))
            .collect()
    }

    fn ids(fused: &[FusedResult]) -> Vec<&str> {
        fused.iter().map(|f| f.id()).collect()
    }

    #[test]
    fn test_rrf_first_seen_tie_break() {
        let a = list(&["x", "y", "z"], StrategyKind::Semantic);
        let b = list(&["y", "x", "w"], StrategyKind::Lexical);

        let fused = reciprocal_rank_fusion(vec![a, b], &FusionConfig::default());

        assert_eq!(ids(&fused), vec!["x", "y", "z", "w"]);
        assert_eq!(fused[0].confidence, fused[1].confidence);
        assert_eq!(fused[2].confidence, fused[3].confidence);
    }

    #[test]
    fn test_rrf_is_deterministic() {
        let make = || {
            vec![
                list(&["a", "b", "c"], StrategyKind::Semantic),
                list(&["c", "d"], StrategyKind::Lexical),
                list(&["d", "a", "e"], StrategyKind::Entity),
            ]
        };

        let first = reciprocal_rank_fusion(make(), &FusionConfig::default());
        let second = reciprocal_rank_fusion(make(), &FusionConfig::default());
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_rrf_confidence_normalization() {
        let a = list(&["x"], StrategyKind::Semantic);
        let b = list(&["x"], StrategyKind::Lexical);

        let fused = reciprocal_rank_fusion(vec![a, b], &FusionConfig::default());
        let expected = ((1.0 / 61.0 + 1.0 / 61.0) * 2.0_f32).min(1.0);

        assert_eq!(fused.len(), 1);
        assert!((fused[0].confidence - expected).abs() < 1e-6);
        assert_eq!(
            fused[0].matched_by,
            vec![StrategyKind::Semantic, StrategyKind::Lexical]
        );
    }

    #[test]
    fn test_rrf_confidence_capped_at_one() {
        let config = FusionConfig::new(0.0, 2.0).unwrap();
        let fused = reciprocal_rank_fusion(vec![list(&["x"], StrategyKind::Entity)], &config);
        assert_eq!(fused[0].confidence, 1.0);
    }

    #[test]
    fn test_rrf_no_duplicate_ids() {
        let a = list(&["x", "y", "x"], StrategyKind::Entity);
        let b = list(&["y", "y"], StrategyKind::Lexical);

        let fused = reciprocal_rank_fusion(vec![a, b], &FusionConfig::default());
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_rrf_keeps_first_seen_record_and_fills_gaps() {
        let semantic = Candidate::new("x", "semantic text", 0.9, StrategyKind::Semantic)
            .with_metadata(serde_json::json!({ "pack": "tax" }));
        let lexical = Candidate::new("x", "lexical text", 0.7, StrategyKind::Lexical)
            .with_title("Home office guide")
            .with_source("tax")
            .with_metadata(serde_json::json!({ "pack": "payroll", "page": 3 }));

        let fused = reciprocal_rank_fusion(
            vec![vec![semantic], vec![lexical]],
            &FusionConfig::default(),
        );

        assert_eq!(fused.len(), 1);
        let record = &fused[0].candidate;
        assert_eq!(record.content, "semantic text");
        assert_eq!(record.strategy, StrategyKind::Semantic);
        assert_eq!(record.title.as_deref(), Some("Home office guide"));
        assert_eq!(record.source.as_deref(), Some("tax"));
        assert_eq!(record.metadata, serde_json::json!({ "pack": "tax", "page": 3 }));
        assert_eq!(
            fused[0].matched_by,
            vec![StrategyKind::Semantic, StrategyKind::Lexical]
        );
    }

    #[test]
    fn test_rrf_empty_input() {
        let fused = reciprocal_rank_fusion(vec![vec![], vec![]], &FusionConfig::default());
        assert!(fused.is_empty());
    }

    #[test]
    fn test_invalid_config() {
        assert!(FusionConfig::new(-1.0, 2.0).is_err());
        assert!(FusionConfig::new(60.0, 0.0).is_err());
    }
}
