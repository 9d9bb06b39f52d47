//! Per-label logistic-regression reranker.
//!
//! A model decides whether a candidate label proposed by retrieval really
//! belongs to a document. Training examples are the documents for which the
//! label was retrieved: positives carry the label, negatives do not.
//!
//! # Class-balanced SGD
//!
//! Extreme label problems are dominated by negatives. Each SGD step first
//! draws the *class* (positive with probability `p`, whatever the pool sizes),
//! then a uniform example from that class. This two-stage draw is not the
//! same as a weighted draw over the pooled examples when the classes differ
//! in size.
//!
//! ```text
//! z    = σ(w·x + b)
//! w_f -= η_t (z − y) x_f     for f in x
//! b   -= η_t (z − y)
//! η_t  = η / (1 + epoch / iterations)
//! ```

use crate::persistence::codec::{ArtifactReader, ArtifactWriter, ID_BYTES, WEIGHT_BYTES};
use crate::persistence::PersistenceResult;
use crate::sparse::SparseVector;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// SGD hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerParams {
    /// Initial learning rate η.
    pub eta: f32,
    /// Probability that a step samples the positive class.
    pub positive_probability: f32,
    /// Number of epochs.
    pub iterations: usize,
}

impl Default for RerankerParams {
    fn default() -> Self {
        Self {
            eta: 0.2,
            positive_probability: 0.76,
            iterations: 40,
        }
    }
}

/// Sparse linear model with bias.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BinaryClassifier {
    weights: SparseVector,
    bias: f32,
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl BinaryClassifier {
    /// Assemble a model from learned weights and bias.
    pub fn from_parts(weights: SparseVector, bias: f32) -> Self {
        Self { weights, bias }
    }

    /// Train on `positives` vs `negatives`.
    ///
    /// With no positives the model is "always negative" (bias −1); with no
    /// negatives it is "always positive" (bias +1). Neither runs SGD.
    pub fn train<R: Rng + ?Sized>(
        positives: &[&SparseVector],
        negatives: &[&SparseVector],
        params: &RerankerParams,
        rng: &mut R,
    ) -> Self {
        let mut features: Vec<u32> = positives
            .iter()
            .chain(negatives)
            .flat_map(|x| x.features())
            .collect();
        features.sort_unstable();
        features.dedup();

        let mut weights = vec![0.0f32; features.len()];
        let mut bias = 0.0f32;

        if positives.is_empty() {
            bias = -1.0;
        } else if negatives.is_empty() {
            bias = 1.0;
        } else {
            // Resolve feature ids to weight slots once, not per step.
            let slots = |x: &SparseVector| -> Vec<(usize, f32)> {
                x.iter()
                    .filter_map(|(f, v)| features.binary_search(&f).ok().map(|slot| (slot, v)))
                    .collect()
            };
            let pos: Vec<Vec<(usize, f32)>> = positives.iter().map(|&x| slots(x)).collect();
            let neg: Vec<Vec<(usize, f32)>> = negatives.iter().map(|&x| slots(x)).collect();

            let steps = pos.len() + neg.len();
            let iterations = params.iterations as f32;
            for epoch in 0..params.iterations {
                let eta = params.eta / (1.0 + epoch as f32 / iterations);
                for _ in 0..steps {
                    let (y, x) = if rng.gen::<f32>() < params.positive_probability {
                        (1.0, &pos[rng.gen_range(0..pos.len())])
                    } else {
                        (0.0, &neg[rng.gen_range(0..neg.len())])
                    };
                    let z = sigmoid(x.iter().map(|&(s, v)| weights[s] * v).sum::<f32>() + bias);
                    let g = eta * (z - y);
                    for &(s, v) in x {
                        weights[s] -= g * v;
                    }
                    bias -= g;
                }
            }
        }

        Self {
            weights: SparseVector::from_sorted(features.into_iter().zip(weights).collect()),
            bias,
        }
    }

    /// Decision value `w·x + b`; features the model never saw weigh zero.
    pub fn predict(&self, x: &SparseVector) -> f32 {
        self.weights.dot(x) + self.bias
    }

    pub fn bias(&self) -> f32 {
        self.bias
    }

    /// All trained weights, zeros included.
    pub fn weights(&self) -> &SparseVector {
        &self.weights
    }

    /// Number of features with a nonzero weight.
    pub fn nonzero_weight_count(&self) -> usize {
        self.weights.iter().filter(|&(_, w)| w != 0.0).count()
    }

    /// Weights that survive persistence.
    pub fn nonzero_weights(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.weights.iter().filter(|&(_, w)| w != 0.0)
    }

    /// `[u64 m][(i32 feature, f32 weight) × m][f32 bias]`, zeros pruned.
    pub(crate) fn encode<W: Write>(&self, w: &mut ArtifactWriter<W>) -> PersistenceResult<()> {
        w.write_len(self.nonzero_weight_count())?;
        for (feature, weight) in self.nonzero_weights() {
            w.write_feature_id(feature)?;
            w.write_f32(weight)?;
        }
        w.write_f32(self.bias)
    }

    pub(crate) fn decode<R: Read>(r: &mut ArtifactReader<R>) -> PersistenceResult<Self> {
        let len = r.read_len("weight count", ID_BYTES + WEIGHT_BYTES)?;
        let mut pairs = Vec::with_capacity(len);
        for _ in 0..len {
            let feature = r.read_feature_id("weight feature id")?;
            let weight = r.read_f32("weight")?;
            pairs.push((feature, weight));
        }
        let bias = r.read_f32("bias")?;
        Ok(Self {
            weights: SparseVector::from_pairs(pairs),
            bias,
        })
    }
}
