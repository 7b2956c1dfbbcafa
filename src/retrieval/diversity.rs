//! Maximal Marginal Relevance diversification

use crate::retrieval::FusedResult;
use std::collections::HashSet;

/// Configuration for MMR selection
#[derive(Debug, Clone)]
pub struct DiversityConfig {
    /// Weight of relevance against redundancy (1.0 ignores redundancy)
    pub lambda: f32,

    /// Maximum number of results kept
    pub cap: usize,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            lambda: 0.5,
            cap: 10,
        }
    }
}

/// Jaccard similarity over lower-cased, whitespace-separated word sets
///
/// Two empty texts have similarity 0.
pub fn text_similarity(a: &str, b: &str) -> f32 {
    let lower_a = a.to_lowercase();
    let lower_b = b.to_lowercase();
    let words_a: HashSet<&str> = lower_a.split_whitespace().collect();
    let words_b: HashSet<&str> = lower_b.split_whitespace().collect();

    let union = words_a.union(&words_b).count();
    if union == 0 {
        return 0.0;
    }

    let intersection = words_a.intersection(&words_b).count();
    intersection as f32 / union as f32
}

/// Greedy MMR re-selection
///
/// Seeds with the top-ranked item, then repeatedly picks the candidate
/// maximizing `lambda * confidence - (1 - lambda) * max_sim_to_selected`.
/// Ties go to the earlier-ranked candidate. Stops at `config.cap` items.
pub fn maximal_marginal_relevance(
    results: Vec<FusedResult>,
    config: &DiversityConfig,
) -> Vec<FusedResult> {
    if config.cap == 0 {
        return Vec::new();
    }
    if results.len() <= 1 {
        return results;
    }

    let lambda = config.lambda;
    let mut remaining = results;
    let mut selected = vec![remaining.remove(0)];

    while !remaining.is_empty() && selected.len() < config.cap {
        let mut best_score = f32::NEG_INFINITY;
        let mut best_index = None;

        for (i, candidate) in remaining.iter().enumerate() {
            let max_sim = selected
                .iter()
                .map(|doc| text_similarity(candidate.content(), doc.content()))
                .fold(0.0_f32, f32::max);

            let mmr_score = lambda * candidate.confidence - (1.0 - lambda) * max_sim;

            if mmr_score > best_score {
                best_score = mmr_score;
                best_index = Some(i);
            }
        }

        match best_index {
            Some(i) => selected.push(remaining.remove(i)),
            None => break,
        }
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{Candidate, StrategyKind};

    fn fused(id: &str, content: &str, confidence: f32) -> FusedResult {
        FusedResult {
            candidate: Candidate::new(id, content, confidence, StrategyKind::Semantic),
            confidence,
            matched_by: vec![StrategyKind::Semantic],
        }
    }

    #[test]
    fn test_text_similarity() {
        assert_eq!(text_similarity("Office Rent", "office rent"), 1.0);
        assert_eq!(text_similarity("a b", "c d"), 0.0);
        assert!((text_similarity("a b c", "b c d") - 0.5).abs() < 1e-6);
        assert_eq!(text_similarity("", "   "), 0.0);
    }

    #[test]
    fn test_mmr_prefers_novel_content() {
        let results = vec![
            fused("1", "home office rent deduction rules", 0.9),
            fused("2", "home office rent deduction rules explained", 0.85),
            fused("3", "vehicle mileage logbook requirements", 0.8),
        ];

        let selected = maximal_marginal_relevance(results, &DiversityConfig::default());
        let ids: Vec<&str> = selected.iter().map(|r| r.id()).collect();

        assert_eq!(ids, vec!["1", "3", "2"]);
    }

    #[test]
    fn test_mmr_respects_cap() {
        let results: Vec<FusedResult> = (0..15)
            .map(|i| fused(&i.to_string(), &format!("unique{} words{}", i, i), 0.5))
            .collect();

        let selected = maximal_marginal_relevance(results, &DiversityConfig::default());
        assert_eq!(selected.len(), 10);
        assert_eq!(selected[0].id(), "0");
    }

    #[test]
    fn test_mmr_lambda_one_keeps_relevance_order() {
        let results = vec![
            fused("1", "same text", 0.9),
            fused("2", "same text", 0.8),
            fused("3", "other words", 0.7),
        ];

        let config = DiversityConfig {
            lambda: 1.0,
            cap: 10,
        };
        let selected = maximal_marginal_relevance(results, &config);
        let ids: Vec<&str> = selected.iter().map(|r| r.id()).collect();

        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_mmr_small_inputs() {
        assert!(maximal_marginal_relevance(Vec::new(), &DiversityConfig::default()).is_empty());

        let single = vec![fused("1", "text", 0.4)];
        assert_eq!(
            maximal_marginal_relevance(single, &DiversityConfig::default()).len(),
            1
        );
    }
}
