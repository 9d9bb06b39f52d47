//! Sparse feature vectors.
//!
//! Entries are kept sorted by feature id with unique keys, so dot products are
//! merge joins and lookups are binary searches. Absent features weigh zero.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Largest feature id accepted from corpus text or artifacts.
///
/// Posting lists and idf tables are dense in the feature id, so this caps
/// their length.
pub const MAX_FEATURE_ID: u32 = (1 << 24) - 1;

/// Mapping from feature id to weight; unlisted ids are implicitly zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    entries: Vec<(u32, f32)>,
}

impl SparseVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from arbitrary `(feature, weight)` pairs.
    ///
    /// When a feature id repeats, the first occurrence wins.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (u32, f32)>,
    {
        let mut entries: Vec<(u32, f32)> = pairs.into_iter().collect();
        // Stable sort keeps the first occurrence ahead of later duplicates.
        entries.sort_by_key(|&(feature, _)| feature);
        entries.dedup_by_key(|&mut (feature, _)| feature);
        Self { entries }
    }

    /// Build from entries already sorted by strictly increasing feature id.
    pub(crate) fn from_sorted(entries: Vec<(u32, f32)>) -> Self {
        debug_assert!(entries.windows(2).all(|w| w[0].0 < w[1].0));
        Self { entries }
    }

    /// Feature-wise sum of several vectors.
    pub fn sum<'a, I>(vectors: I) -> Self
    where
        I: IntoIterator<Item = &'a SparseVector>,
    {
        let mut acc: BTreeMap<u32, f32> = BTreeMap::new();
        for v in vectors {
            for &(feature, weight) in &v.entries {
                *acc.entry(feature).or_insert(0.0) += weight;
            }
        }
        Self {
            entries: acc.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in ascending feature order.
    pub fn entries(&self) -> &[(u32, f32)] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.entries.iter().copied()
    }

    pub fn features(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|&(feature, _)| feature)
    }

    /// Weight of `feature`, zero when absent.
    pub fn get(&self, feature: u32) -> f32 {
        self.entries
            .binary_search_by_key(&feature, |&(f, _)| f)
            .map(|i| self.entries[i].1)
            .unwrap_or(0.0)
    }

    /// Largest feature id present.
    pub fn max_feature(&self) -> Option<u32> {
        self.entries.last().map(|&(feature, _)| feature)
    }

    /// Dot product over shared features.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        let (a, b) = (&self.entries, &other.entries);
        let (mut i, mut j) = (0, 0);
        let mut dot = 0.0f32;
        while i < a.len() && j < b.len() {
            match a[i].0.cmp(&b[j].0) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    dot += a[i].1 * b[j].1;
                    i += 1;
                    j += 1;
                }
            }
        }
        dot
    }

    /// Sum of squared weights, accumulated in f64.
    pub fn energy(&self) -> f64 {
        self.entries
            .iter()
            .map(|&(_, w)| f64::from(w) * f64::from(w))
            .sum()
    }

    /// Scale to unit L2 norm. Zero-energy vectors are left untouched.
    pub fn normalize_l2(&mut self) {
        let energy = self.energy();
        if energy > 0.0 {
            let scale = 1.0 / energy.sqrt();
            for (_, w) in &mut self.entries {
                *w = (f64::from(*w) * scale) as f32;
            }
        }
    }

    pub(crate) fn weights_mut(&mut self) -> impl Iterator<Item = (u32, &mut f32)> + '_ {
        self.entries.iter_mut().map(|(feature, w)| (*feature, w))
    }

    /// Drop entries whose weight is exactly zero.
    pub fn prune_zeros(&mut self) {
        self.entries.retain(|&(_, w)| w != 0.0);
    }
}

impl FromIterator<(u32, f32)> for SparseVector {
    fn from_iter<I: IntoIterator<Item = (u32, f32)>>(iter: I) -> Self {
        Self::from_pairs(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_features_keep_first() {
        let v = SparseVector::from_pairs([(3, 1.0), (1, 2.0), (3, 9.0)]);
        assert_eq!(v.entries(), &[(1, 2.0), (3, 1.0)]);
    }

    #[test]
    fn dot_only_counts_shared_features() {
        let a = SparseVector::from_pairs([(1, 1.0), (2, 2.0), (5, 3.0)]);
        let b = SparseVector::from_pairs([(2, 4.0), (5, 1.0), (9, 7.0)]);
        assert_eq!(a.dot(&b), 2.0 * 4.0 + 3.0);
        assert_eq!(a.dot(&SparseVector::new()), 0.0);
    }

    #[test]
    fn normalize_skips_zero_energy() {
        let mut zero = SparseVector::from_pairs([(1, 0.0)]);
        zero.normalize_l2();
        assert_eq!(zero.get(1), 0.0);

        let mut v = SparseVector::from_pairs([(1, 3.0), (2, 4.0)]);
        v.normalize_l2();
        assert!((v.get(1) - 0.6).abs() < 1e-6);
        assert!((v.get(2) - 0.8).abs() < 1e-6);
    }

    #[test]
    fn sum_merges_features() {
        let a = SparseVector::from_pairs([(1, 1.0)]);
        let b = SparseVector::from_pairs([(1, 1.0), (2, 1.0)]);
        let s = SparseVector::sum([&a, &b]);
        assert_eq!(s.entries(), &[(1, 2.0), (2, 1.0)]);
    }

    #[test]
    fn missing_feature_reads_zero() {
        let v = SparseVector::from_pairs([(4, 1.0)]);
        assert_eq!(v.get(3), 0.0);
        assert_eq!(v.max_feature(), Some(4));
    }
}
