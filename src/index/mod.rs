//! Inverted index over sparse document vectors.
//!
//! Similarity is the doubled dot product `2 · Σ q_f · d_f`; on L2-normalized
//! inputs this ranks exactly like cosine similarity.
//!
//! # Exact search
//!
//! [`InvertedIndex::knn`] scans the posting list of every query feature. The
//! query features are split across the rayon pool; each task appends
//! `(doc, partial)` pairs into its own buffer. Buffers are concatenated, sorted
//! by document id, and each contiguous run is summed into one score before it
//! reaches a bounded min-heap. This is the only synchronization point.
//!
//! # Two-phase approximate search
//!
//! Frequent features have long posting lists and carry little information.
//! [`InvertedIndex::fast_knn`] first searches with only the *rare* features
//! (posting list shorter than `rarity_threshold`) and a generous candidate
//! budget, then re-scores every candidate exactly against the full query:
//!
//! ```text
//! phase 1: knn(rare(query), first_k)            cheap candidate generation
//! phase 2: knn(query, k) if phase 1 found none  query had no rare features
//! phase 3: exact 2·q·d on each candidate         parallel, per-task heaps
//! ```
//!
//! Candidate generation is approximate; the final ranking over the candidate
//! set is exact.
//!
//! Ties in score come back in no particular order.

mod topk;

pub use topk::Hit;
pub(crate) use topk::TopK;

use crate::sparse::SparseVector;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

/// One entry of a posting list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Posting {
    pub doc: u32,
    pub weight: f32,
}

/// Index size summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub num_documents: usize,
    /// Length of the dense feature table (max feature id + 1).
    pub feature_slots: usize,
    pub num_postings: usize,
}

/// Posting lists keyed by feature id, over a shared immutable collection.
#[derive(Debug, Clone)]
pub struct InvertedIndex {
    postings: Vec<Vec<Posting>>,
    documents: Arc<[SparseVector]>,
}

impl InvertedIndex {
    /// Index every document of `documents` in one ascending pass.
    ///
    /// Posting lists come out sorted by document id without a sort step.
    pub fn build(documents: Arc<[SparseVector]>) -> Self {
        debug_assert!(documents.len() <= u32::MAX as usize);
        let mut index = Self {
            postings: Vec::new(),
            documents: Arc::clone(&documents),
        };
        for (doc, vector) in documents.iter().enumerate() {
            index.insert(doc as u32, vector);
        }
        index
    }

    fn insert(&mut self, doc: u32, vector: &SparseVector) {
        for (feature, weight) in vector.iter() {
            let slot = feature as usize;
            if slot >= self.postings.len() {
                self.postings.resize_with(slot + 1, Vec::new);
            }
            self.postings[slot].push(Posting { doc, weight });
        }
    }

    /// The indexed collection.
    pub fn documents(&self) -> &[SparseVector] {
        &self.documents
    }

    pub fn num_documents(&self) -> usize {
        self.documents.len()
    }

    /// Posting list for `feature`; empty when no document has it.
    pub fn postings(&self, feature: u32) -> &[Posting] {
        self.postings
            .get(feature as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            num_documents: self.documents.len(),
            feature_slots: self.postings.len(),
            num_postings: self.postings.iter().map(Vec::len).sum(),
        }
    }

    /// Exact top-`k` documents by `2 · q · d`, descending.
    pub fn knn(&self, query: &SparseVector, k: usize) -> Vec<Hit> {
        if k == 0 || query.is_empty() {
            return Vec::new();
        }

        // Map: private buffer per task. Reduce: concatenation, order preserved.
        let mut partials: Vec<(u32, f32)> = query
            .entries()
            .par_iter()
            .fold(Vec::new, |mut hits, &(feature, weight)| {
                let query_w = 2.0 * weight;
                hits.extend(
                    self.postings(feature)
                        .iter()
                        .map(|p| (p.doc, query_w * p.weight)),
                );
                hits
            })
            .reduce(Vec::new, |mut a, mut b| {
                a.append(&mut b);
                a
            });

        // Stable, so each document's partials are summed in query-feature order.
        partials.par_sort_by_key(|&(doc, _)| doc);

        let mut top = TopK::new(k);
        for run in partials.chunk_by(|a, b| a.0 == b.0) {
            let score: f32 = run.iter().map(|&(_, s)| s).sum();
            top.push(run[0].0, score);
        }
        top.into_sorted_vec()
    }

    /// Two-phase approximate top-`k`; see the module docs.
    pub fn fast_knn(
        &self,
        query: &SparseVector,
        k: usize,
        first_k: usize,
        rarity_threshold: usize,
    ) -> Vec<Hit> {
        if k == 0 || query.is_empty() {
            return Vec::new();
        }

        let rare = self.rare_features(query, rarity_threshold);
        let mut candidates = self.knn(&rare, first_k);
        if candidates.is_empty() {
            debug!(
                features = query.len(),
                rare = rare.len(),
                "no rare-feature candidates, searching with the full query"
            );
            candidates = self.knn(query, k);
        }

        candidates
            .par_iter()
            .fold(
                || TopK::new(k),
                |mut top, hit| {
                    top.push(hit.id, self.exact_score(query, hit.id));
                    top
                },
            )
            .reduce(|| TopK::new(k), TopK::merge)
            .into_sorted_vec()
    }

    /// Query restricted to indexed features with fewer than `threshold` postings.
    fn rare_features(&self, query: &SparseVector, threshold: usize) -> SparseVector {
        let kept = query
            .iter()
            .filter(|&(feature, _)| {
                self.postings
                    .get(feature as usize)
                    .is_some_and(|list| list.len() < threshold)
            })
            .collect();
        SparseVector::from_sorted(kept)
    }

    fn exact_score(&self, query: &SparseVector, doc: u32) -> f32 {
        self.documents
            .get(doc as usize)
            .map(|d| 2.0 * query.dot(d))
            .unwrap_or(0.0)
    }
}
