//! Reranking retrieved candidates with per-label classifiers.

use crate::index::Hit;
use crate::sparse::SparseVector;
use crate::store::ClassifierStore;
use tracing::trace;

/// Score every candidate that has a model, best first.
///
/// Candidates without a stored model are dropped. Equal scores are ordered
/// by label id, larger first. `Hit::id` is the label id.
pub fn score_candidates(
    query: &SparseVector,
    candidates: &[u32],
    store: &ClassifierStore,
) -> Vec<Hit> {
    let mut scored: Vec<Hit> = candidates
        .iter()
        .filter_map(|&label| match store.get(label) {
            Some(model) => Some(Hit {
                id: label,
                score: model.predict(query),
            }),
            None => {
                trace!(label, "no reranker for candidate");
                None
            }
        })
        .collect();
    scored.sort_unstable_by(|a, b| b.score.total_cmp(&a.score).then_with(|| b.id.cmp(&a.id)));
    scored
}

/// Final label list for one document.
///
/// The best-scoring candidate is always kept so every document gets a
/// prediction; the rest are kept only when the classifier accepts them
/// (decision value ≥ 0).
pub fn rank_candidates(
    query: &SparseVector,
    candidates: &[u32],
    store: &ClassifierStore,
) -> Vec<u32> {
    score_candidates(query, candidates, store)
        .into_iter()
        .enumerate()
        .filter(|(rank, hit)| *rank == 0 || hit.score >= 0.0)
        .map(|(_, hit)| hit.id)
        .collect()
}
