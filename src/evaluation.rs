//! Macro-averaged precision / recall / F1 and top-1 accuracy.

use crate::corpus::LabelSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct LabelCounts {
    true_positive: u64,
    false_positive: u64,
    false_negative: u64,
}

/// Aggregate scores over every document seen so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    pub macro_f1: f64,
    pub macro_precision: f64,
    pub macro_recall: f64,
    pub top1_accuracy: f64,
}

/// Streaming per-label confusion counts.
#[derive(Debug, Clone, Default)]
pub struct Evaluation {
    examples: u64,
    top1_hits: u64,
    counts: BTreeMap<u32, LabelCounts>,
}

impl Evaluation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Account one document: `predicted` in rank order vs its true labels.
    pub fn update(&mut self, predicted: &[u32], actual: &LabelSet) {
        self.examples += 1;
        if let Some(top) = predicted.first() {
            if actual.contains(top) {
                self.top1_hits += 1;
            }
        }
        for &label in predicted {
            let c = self.counts.entry(label).or_default();
            if actual.contains(&label) {
                c.true_positive += 1;
            } else {
                c.false_positive += 1;
            }
        }
        for &label in actual {
            let c = self.counts.entry(label).or_default();
            if !predicted.contains(&label) {
                c.false_negative += 1;
            }
        }
    }

    pub fn examples(&self) -> u64 {
        self.examples
    }

    /// Macro averages divide by every label seen, predicted or actual.
    pub fn score(&self) -> Scores {
        if self.examples == 0 || self.counts.is_empty() {
            return Scores::default();
        }
        let (mut precision, mut recall) = (0.0, 0.0);
        for c in self.counts.values() {
            let tp = c.true_positive as f64;
            let tp_fp = tp + c.false_positive as f64;
            let tp_fn = tp + c.false_negative as f64;
            if tp_fp > 0.0 && tp_fn > 0.0 {
                precision += tp / tp_fp;
                recall += tp / tp_fn;
            }
        }
        let labels = self.counts.len() as f64;
        let (macro_precision, macro_recall) = (precision / labels, recall / labels);
        let macro_f1 = if macro_precision + macro_recall > 0.0 {
            2.0 * macro_precision * macro_recall / (macro_precision + macro_recall)
        } else {
            0.0
        };
        Scores {
            macro_f1,
            macro_precision,
            macro_recall,
            top1_accuracy: self.top1_hits as f64 / self.examples as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions() {
        let mut e = Evaluation::new();
        e.update(&[1, 2], &LabelSet::from([1, 2]));
        e.update(&[3], &LabelSet::from([3]));
        let s = e.score();
        assert_eq!(s.macro_precision, 1.0);
        assert_eq!(s.macro_recall, 1.0);
        assert_eq!(s.macro_f1, 1.0);
        assert_eq!(s.top1_accuracy, 1.0);
    }

    #[test]
    fn mixed_predictions() {
        let mut e = Evaluation::new();
        // label 1: tp, label 2: fp, label 3: fn
        e.update(&[2, 1], &LabelSet::from([1, 3]));
        let s = e.score();
        assert!((s.macro_precision - 1.0 / 3.0).abs() < 1e-12);
        assert!((s.macro_recall - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(s.top1_accuracy, 0.0);
    }

    #[test]
    fn empty_is_zero() {
        assert_eq!(Evaluation::new().score(), Scores::default());
    }
}
