//! Pipeline configuration.
//!
//! Every field has a production default, so a TOML file only needs the
//! values it overrides:
//!
//! ```toml
//! k_train = 10
//! seed = 13
//!
//! [reranker]
//! iterations = 20
//!
//! [artifacts]
//! model = "/data/model.bin"
//! ```

use crate::binary::RerankerParams;
use crate::error::{LexirankError, Result};
use crate::knn_vote::KnnVoteParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where each stage reads and writes its artifacts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactPaths {
    pub cache: PathBuf,
    pub centroid: PathBuf,
    pub weights: PathBuf,
    pub model: PathBuf,
    pub submission: PathBuf,
}

impl Default for ArtifactPaths {
    fn default() -> Self {
        Self::in_dir(".")
    }
}

impl ArtifactPaths {
    /// Default file names under `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            cache: dir.join("ncc_cache.bin"),
            centroid: dir.join("centroid.bin"),
            weights: dir.join("weight.bin"),
            model: dir.join("model.bin"),
            submission: dir.join("submission.txt"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Candidates cached per training document; rerankers train on these.
    pub k_train: usize,
    /// Candidates reranked per document at prediction time.
    pub k_predict: usize,
    pub reranker: RerankerParams,
    pub knn_vote: KnnVoteParams,
    /// Probability that a label membership sends its document to the held-out split.
    pub validation_ratio: f64,
    /// Seed for the held-out split and per-label training streams.
    pub seed: u64,
    /// Worker threads; `None` uses every available processor.
    pub threads: Option<usize>,
    /// Log a progress line every this many items.
    pub progress_every: usize,
    pub artifacts: ArtifactPaths,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            k_train: 10,
            k_predict: 8,
            reranker: RerankerParams::default(),
            knn_vote: KnnVoteParams::default(),
            validation_ratio: 0.05,
            seed: 13,
            threads: None,
            progress_every: 10_000,
            artifacts: ArtifactPaths::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| LexirankError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LexirankError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(LexirankError::InvalidParameter(msg.to_string()));
        if self.k_train == 0 || self.k_predict == 0 {
            return invalid("k_train and k_predict must be > 0");
        }
        if !(0.0..=1.0).contains(&self.reranker.positive_probability) {
            return invalid("reranker.positive_probability must be in [0, 1]");
        }
        if self.reranker.eta.is_nan() || self.reranker.eta <= 0.0 {
            return invalid("reranker.eta must be > 0");
        }
        if !(0.0..1.0).contains(&self.validation_ratio) {
            return invalid("validation_ratio must be in [0, 1)");
        }
        if self.knn_vote.k == 0 || self.knn_vote.rarity_divisor == 0 {
            return invalid("knn_vote.k and knn_vote.rarity_divisor must be > 0");
        }
        if self.threads == Some(0) {
            return invalid("threads must be > 0 when set");
        }
        Ok(())
    }
}
