//! Property-based tests for lexirank retrieval and reranking.
//!
//! These tests verify invariants that should hold regardless of input:
//! - `knn` is exact against brute force
//! - `fast_knn` matches `knn` when every feature counts as rare
//! - Centroids are unit vectors over the union of their members' features
//! - Reranked labels are a subset of the candidates

use lexirank::{
    BinaryClassifier, CentroidClassifier, ClassifierStore, InvertedIndex, SparseVector,
    TfidfVectorizer,
};
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

prop_compose! {
    fn arb_vector()(pairs in prop::collection::vec((0u32..40, 0.1f32..1.0), 1..8)) -> SparseVector {
        SparseVector::from_pairs(pairs)
    }
}

prop_compose! {
    fn arb_collection(max: usize)(
        docs in prop::collection::vec(arb_vector(), 1..max)
    ) -> Vec<SparseVector> {
        docs
    }
}

/// All positive scores, descending.
fn brute_force(query: &SparseVector, docs: &[SparseVector]) -> Vec<f32> {
    let mut scores: Vec<f32> = docs
        .iter()
        .map(|d| 2.0 * query.dot(d))
        .filter(|&s| s > 0.0)
        .collect();
    scores.sort_by(|a, b| b.total_cmp(a));
    scores
}

fn assert_scores_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-4, "{actual:?} vs {expected:?}");
    }
}

mod search_props {
    use super::*;

    proptest! {
        #[test]
        fn knn_is_exact(docs in arb_collection(40), query in arb_vector(), k in 1usize..10) {
            let index = InvertedIndex::build(Arc::from(docs.clone()));
            let hits = index.knn(&query, k);
            prop_assert!(hits.len() <= k);

            let scores: Vec<f32> = hits.iter().map(|h| h.score).collect();
            let expected = brute_force(&query, &docs);
            assert_scores_close(&scores, &expected[..expected.len().min(k)]);

            for hit in &hits {
                let exact = 2.0 * query.dot(&docs[hit.id as usize]);
                prop_assert!((hit.score - exact).abs() < 1e-4);
            }
        }

        #[test]
        fn fast_knn_matches_knn_when_all_features_are_rare(
            docs in arb_collection(40),
            query in arb_vector(),
            k in 1usize..10,
        ) {
            let n = docs.len();
            let index = InvertedIndex::build(Arc::from(docs));
            let exact: Vec<f32> = index.knn(&query, k).iter().map(|h| h.score).collect();
            let fast: Vec<f32> =
                index.fast_knn(&query, k, n, n + 1).iter().map(|h| h.score).collect();
            assert_scores_close(&fast, &exact);
        }

        #[test]
        fn fast_knn_never_exceeds_k(
            docs in arb_collection(40),
            query in arb_vector(),
            k in 1usize..10,
            first_k in 1usize..20,
            threshold in 0usize..10,
        ) {
            let index = InvertedIndex::build(Arc::from(docs));
            let hits = index.fast_knn(&query, k, first_k, threshold);
            prop_assert!(hits.len() <= k);
            for pair in hits.windows(2) {
                prop_assert!(pair[0].score >= pair[1].score);
            }
        }
    }
}

mod centroid_props {
    use super::*;

    proptest! {
        #[test]
        fn centroids_are_unit_member_unions(
            docs in arb_collection(30),
            assignment in prop::collection::vec(0u32..5, 30),
        ) {
            let mut categories: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
            for doc in 0..docs.len() {
                categories.entry(assignment[doc]).or_default().push(doc as u32);
            }
            let classifier = CentroidClassifier::train(&categories, &docs);
            prop_assert_eq!(classifier.len(), categories.len());

            for (label, members) in &categories {
                let centroid = classifier.centroid(*label).unwrap();
                prop_assert!((centroid.energy() - 1.0).abs() < 1e-4);

                let union: BTreeSet<u32> = members
                    .iter()
                    .flat_map(|&d| docs[d as usize].features())
                    .collect();
                let features: BTreeSet<u32> = centroid.features().collect();
                prop_assert_eq!(features, union);
            }
        }

        #[test]
        fn tfidf_output_is_unit_length(docs in arb_collection(30), query in arb_vector()) {
            let vectorizer = TfidfVectorizer::train(&docs);
            let mut v = query;
            vectorizer.transform(&mut v);
            prop_assert!((v.energy() - 1.0).abs() < 1e-4);
        }
    }
}

mod rerank_props {
    use super::*;
    use lexirank::rerank::rank_candidates;

    proptest! {
        #[test]
        fn ranked_labels_come_from_candidates(
            biases in prop::collection::vec(-2.0f32..2.0, 1..10),
            candidates in prop::collection::vec(0u32..15, 0..10),
            query in arb_vector(),
        ) {
            let store = ClassifierStore::new();
            for (label, &bias) in biases.iter().enumerate() {
                store.set(label as u32, BinaryClassifier::from_parts(SparseVector::new(), bias));
            }

            let ranked = rank_candidates(&query, &candidates, &store);
            let modelled = candidates.iter().any(|&c| store.get(c).is_some());
            prop_assert_eq!(ranked.is_empty(), !modelled);
            for label in &ranked {
                prop_assert!(candidates.contains(label));
            }
            for label in ranked.iter().skip(1) {
                prop_assert!(store.get(*label).unwrap().predict(&query) >= 0.0);
            }
        }
    }
}
