//! Confidence filtering, result limiting and citation attachment

use crate::retrieval::{Citation, FusedResult, MetadataStore, SearchResult};
use tracing::{debug, warn};

/// Drop results below `min_confidence`, then keep at most `top_k`
///
/// Filtering runs first so low-confidence leaders never take slots from
/// valid lower-ranked results.
pub fn filter_and_limit(
    results: Vec<FusedResult>,
    min_confidence: f32,
    top_k: usize,
) -> Vec<FusedResult> {
    results
        .into_iter()
        .filter(|r| r.confidence >= min_confidence)
        .take(top_k)
        .collect()
}

/// Attach exactly one citation per result whose metadata lookup succeeds
///
/// Lookups run one at a time. A missing or failing lookup leaves that
/// result's citation list empty.
pub async fn attach_citations(results: &mut [SearchResult], store: &dyn MetadataStore) {
    for result in results.iter_mut() {
        match store.citation_info(&result.id).await {
            Ok(Some(info)) => {
                result.citations = vec![Citation::from_info(&result.id, info, result.confidence)];
            }
            Ok(None) => {
                debug!("No citation metadata for {}", result.id);
                result.citations.clear();
            }
            Err(e) => {
                warn!("Citation lookup failed for {}: {}", result.id, e);
                result.citations.clear();
            }
        }
    }
}
