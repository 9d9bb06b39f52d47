//! Bounded top-k selection.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// A scored document (or centroid) returned by search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    pub id: u32,
    pub score: f32,
}

impl Eq for Hit {}

impl Ord for Hit {
    fn cmp(&self, other: &Self) -> Ordering {
        // Use total_cmp for IEEE 754 total ordering (NaN-safe); id only makes the order total.
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Hit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap holding at most `k` best hits.
#[derive(Debug, Clone)]
pub(crate) struct TopK {
    k: usize,
    heap: BinaryHeap<Reverse<Hit>>,
}

impl TopK {
    pub(crate) fn new(k: usize) -> Self {
        Self {
            k,
            heap: BinaryHeap::with_capacity(k.min(4096) + 1),
        }
    }

    /// Push if not full, otherwise replace the minimum when `score` beats it.
    pub(crate) fn push(&mut self, id: u32, score: f32) {
        if self.heap.len() < self.k {
            self.heap.push(Reverse(Hit { id, score }));
        } else if let Some(mut min) = self.heap.peek_mut() {
            if min.0.score < score {
                *min = Reverse(Hit { id, score });
            }
        }
    }

    /// Fold another heap into this one.
    pub(crate) fn merge(mut self, other: TopK) -> TopK {
        for Reverse(hit) in other.heap {
            self.push(hit.id, hit.score);
        }
        self
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    /// Hits in descending score order.
    pub(crate) fn into_sorted_vec(self) -> Vec<Hit> {
        // Ascending `Reverse<Hit>` is descending `Hit`.
        self.heap
            .into_sorted_vec()
            .into_iter()
            .map(|Reverse(hit)| hit)
            .collect()
    }
}
