//! Labelled sparse corpora: reading, category indexing, held-out splits.
//!
//! Input is one document per line after a header line:
//!
//! ```text
//! 314523, 165538 1250536:1 634175:1 1095759:4
//! ^labels (comma separated)  ^feature:count pairs
//! ```
//!
//! Unlabelled lines (test data) start directly with `feature:count` pairs.

use crate::sparse::{SparseVector, MAX_FEATURE_ID};
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Label ids attached to one document.
pub type LabelSet = BTreeSet<u32>;

/// Label id → member document ids, ascending.
pub type CategoryIndex = BTreeMap<u32, Vec<u32>>;

#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Documents and their labels, aligned by document id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Corpus {
    pub vectors: Vec<SparseVector>,
    pub labels: Vec<LabelSet>,
}

impl Corpus {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn push(&mut self, vector: SparseVector, labels: LabelSet) {
        self.vectors.push(vector);
        self.labels.push(labels);
    }

    pub fn category_index(&self) -> CategoryIndex {
        category_index(&self.labels)
    }
}

/// Parse one document line into its labels and raw feature counts.
///
/// Repeated feature ids keep their first value.
pub fn parse_line(line: &str) -> Result<(LabelSet, SparseVector), String> {
    let mut labels = LabelSet::new();
    let mut pairs = Vec::new();
    for token in line.split_whitespace() {
        if let Some((feature, value)) = token.split_once(':') {
            let feature = feature
                .parse::<u32>()
                .map_err(|e| format!("bad feature id {feature:?}: {e}"))?;
            if feature > MAX_FEATURE_ID {
                return Err(format!("feature id {feature} exceeds {MAX_FEATURE_ID}"));
            }
            let value = value
                .parse::<f32>()
                .map_err(|e| format!("bad feature value {value:?}: {e}"))?;
            pairs.push((feature, value));
        } else {
            if !pairs.is_empty() {
                return Err(format!("label token {token:?} after features"));
            }
            for label in token.split(',').filter(|s| !s.is_empty()) {
                labels.insert(
                    label
                        .parse::<u32>()
                        .map_err(|e| format!("bad label {label:?}: {e}"))?,
                );
            }
        }
    }
    Ok((labels, SparseVector::from_pairs(pairs)))
}

/// Read a corpus, skipping the header line and blank lines.
pub fn read_corpus<R: BufRead>(reader: R) -> Result<Corpus, CorpusError> {
    let mut corpus = Corpus::default();
    for (i, line) in reader.lines().enumerate().skip(1) {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let (labels, vector) =
            parse_line(&line).map_err(|reason| CorpusError::Parse { line: i + 1, reason })?;
        corpus.push(vector, labels);
    }
    Ok(corpus)
}

pub fn open_corpus(path: impl AsRef<Path>) -> Result<Corpus, CorpusError> {
    let path = path.as_ref();
    let corpus = read_corpus(BufReader::with_capacity(1 << 20, File::open(path)?))?;
    info!(path = %path.display(), documents = corpus.len(), "read corpus");
    Ok(corpus)
}

/// Group document ids by label.
pub fn category_index(labels: &[LabelSet]) -> CategoryIndex {
    let mut index = CategoryIndex::new();
    for (doc, set) in labels.iter().enumerate() {
        for &label in set {
            index.entry(label).or_default().push(doc as u32);
        }
    }
    index
}

/// Hold out documents for validation.
///
/// Every (label, document) membership independently sends its document to
/// the held-out side with probability `ratio`, so documents with many labels
/// are more likely to be held out. Both sides are then shuffled with `rng`.
/// Returns `(train, held_out)`.
pub fn split<R: Rng + ?Sized>(corpus: Corpus, ratio: f64, rng: &mut R) -> (Corpus, Corpus) {
    let mut held_out_ids = BTreeSet::new();
    for members in category_index(&corpus.labels).values() {
        for &doc in members {
            if rng.gen::<f64>() < ratio {
                held_out_ids.insert(doc);
            }
        }
    }

    let mut train: Vec<(SparseVector, LabelSet)> =
        Vec::with_capacity(corpus.len() - held_out_ids.len());
    let mut held_out = Vec::with_capacity(held_out_ids.len());
    for (doc, pair) in corpus.vectors.into_iter().zip(corpus.labels).enumerate() {
        if held_out_ids.contains(&(doc as u32)) {
            held_out.push(pair);
        } else {
            train.push(pair);
        }
    }
    train.shuffle(rng);
    held_out.shuffle(rng);

    let collect = |pairs: Vec<(SparseVector, LabelSet)>| {
        let (vectors, labels) = pairs.into_iter().unzip();
        Corpus { vectors, labels }
    };
    (collect(train), collect(held_out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn parses_labels_and_features() {
        let (labels, v) = parse_line("314523, 165538 1250536:1 634175:2.5").unwrap();
        assert_eq!(labels, LabelSet::from([314523, 165538]));
        assert_eq!(v.get(634175), 2.5);
        assert_eq!(v.len(), 2);

        let (labels, _) = parse_line("3,4,5 1:1").unwrap();
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn unlabelled_line() {
        let (labels, v) = parse_line("1:1 2:3").unwrap();
        assert!(labels.is_empty());
        assert_eq!(v.len(), 2);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_line("1:x").is_err());
        assert!(parse_line("1:1 7").is_err());
    }

    #[test]
    fn rejects_feature_ids_past_the_dense_range() {
        assert!(parse_line(&format!("1 {MAX_FEATURE_ID}:1")).is_ok());
        let err = parse_line(&format!("1 {}:1", MAX_FEATURE_ID + 1)).unwrap_err();
        assert!(err.contains("exceeds"), "{err}");
    }

    #[test]
    fn reader_skips_header_and_reports_line() {
        let text = "Data\n1 1:1\n\n2,3 2:1\n";
        let corpus = read_corpus(text.as_bytes()).unwrap();
        assert_eq!(corpus.len(), 2);
        assert_eq!(corpus.category_index()[&1], vec![0]);

        let err = read_corpus("Data\n1 1:1\nbad:1\n".as_bytes()).unwrap_err();
        assert!(matches!(err, CorpusError::Parse { line: 3, .. }));
    }

    #[test]
    fn split_partitions_every_document() {
        let mut corpus = Corpus::default();
        for i in 0..200u32 {
            corpus.push(SparseVector::from_pairs([(i, 1.0)]), LabelSet::from([i % 7]));
        }
        let mut rng = StdRng::seed_from_u64(13);
        let (train, held_out) = split(corpus.clone(), 0.2, &mut rng);
        assert_eq!(train.len() + held_out.len(), 200);
        assert!(!held_out.is_empty());

        let mut features: Vec<u32> = train
            .vectors
            .iter()
            .chain(&held_out.vectors)
            .filter_map(|v| v.max_feature())
            .collect();
        features.sort_unstable();
        assert_eq!(features, (0..200).collect::<Vec<_>>());

        let again = split(corpus, 0.2, &mut StdRng::seed_from_u64(13));
        assert_eq!(again.0, train);
    }
}
