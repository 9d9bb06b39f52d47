//! Instance-based label voting over the training documents.
//!
//! Runs [`InvertedIndex::fast_knn`] against the full training collection and
//! lets each neighbour vote `1 + 0.1 · similarity` for each of its labels.
//! The count term dominates; similarity only separates near ties.

use crate::corpus::LabelSet;
use crate::error::{LexirankError, Result};
use crate::index::InvertedIndex;
use crate::pipeline::CandidateGenerator;
use crate::sparse::SparseVector;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Neighbourhood and output sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnnVoteParams {
    /// Neighbours that vote.
    pub k: usize,
    /// Candidate budget for the rare-feature phase.
    pub first_k: usize,
    /// A feature is rare when its posting list is shorter than `N / rarity_divisor`.
    pub rarity_divisor: usize,
    /// Labels returned per query.
    pub max_labels: usize,
}

impl Default for KnnVoteParams {
    fn default() -> Self {
        Self {
            k: 12,
            first_k: 3000,
            rarity_divisor: 100,
            max_labels: 5,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KnnVoteClassifier {
    index: InvertedIndex,
    labels: Vec<LabelSet>,
    params: KnnVoteParams,
}

impl KnnVoteClassifier {
    pub fn new(
        documents: Arc<[SparseVector]>,
        labels: Vec<LabelSet>,
        params: KnnVoteParams,
    ) -> Result<Self> {
        if documents.len() != labels.len() {
            return Err(LexirankError::InvalidParameter(format!(
                "{} documents but {} label sets",
                documents.len(),
                labels.len()
            )));
        }
        if params.rarity_divisor == 0 {
            return Err(LexirankError::InvalidParameter("rarity_divisor must be > 0".into()));
        }
        Ok(Self {
            index: InvertedIndex::build(documents),
            labels,
            params,
        })
    }

    fn rarity_threshold(&self) -> usize {
        self.index.num_documents() / self.params.rarity_divisor
    }

    /// Up to `max_labels` labels by vote, best first.
    pub fn predict(&self, query: &SparseVector) -> Vec<u32> {
        self.vote(query, self.params.max_labels)
    }

    fn vote(&self, query: &SparseVector, max_labels: usize) -> Vec<u32> {
        let neighbours = self.index.fast_knn(
            query,
            self.params.k,
            self.params.first_k,
            self.rarity_threshold(),
        );

        let mut votes: BTreeMap<u32, f32> = BTreeMap::new();
        for hit in &neighbours {
            for &label in &self.labels[hit.id as usize] {
                *votes.entry(label).or_insert(0.0) += 1.0 + hit.score * 0.1;
            }
        }

        let mut ranked: Vec<(u32, f32)> = votes.into_iter().collect();
        ranked.sort_unstable_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.cmp(&a.0)));
        ranked.into_iter().take(max_labels).map(|(label, _)| label).collect()
    }
}

impl CandidateGenerator for KnnVoteClassifier {
    fn candidates(&self, query: &SparseVector, k: usize) -> Vec<u32> {
        self.vote(query, k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shared_label_wins_the_vote() {
        let docs: Arc<[SparseVector]> = vec![
            SparseVector::from_pairs([(1, 1.0)]),
            SparseVector::from_pairs([(1, 0.8), (2, 0.6)]),
            SparseVector::from_pairs([(3, 1.0)]),
        ]
        .into();
        let labels = vec![LabelSet::from([7]), LabelSet::from([7, 8]), LabelSet::from([9])];
        let params = KnnVoteParams {
            k: 2,
            ..KnnVoteParams::default()
        };
        let clf = KnnVoteClassifier::new(docs, labels, params).unwrap();
        let predicted = clf.predict(&SparseVector::from_pairs([(1, 1.0)]));
        assert_eq!(predicted, vec![7, 8]);
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let docs: Arc<[SparseVector]> = vec![SparseVector::new()].into();
        assert!(KnnVoteClassifier::new(docs, vec![], KnnVoteParams::default()).is_err());
    }
}
