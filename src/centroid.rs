//! Nearest-centroid label retrieval.
//!
//! Each label is represented by the L2-normalized sum of its documents. The
//! centroids are themselves a document collection, searched with
//! [`InvertedIndex::knn`]; centroid ids map to label ids through a parallel
//! array.

use crate::index::{Hit, InvertedIndex};
use crate::persistence::codec::{
    self, ArtifactReader, ArtifactWriter, ID_BYTES, LEN_BYTES, WEIGHT_BYTES,
};
use crate::persistence::{PersistenceError, PersistenceResult};
use crate::pipeline::CandidateGenerator;
use crate::sparse::SparseVector;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

const ARTIFACT: &str = "centroid model";

/// One centroid per observed label, indexed for search.
#[derive(Debug, Clone)]
pub struct CentroidClassifier {
    labels: Vec<u32>,
    index: InvertedIndex,
}

impl CentroidClassifier {
    /// Build centroids from `label → member document ids`.
    ///
    /// Labels with no resolvable member documents get no centroid.
    pub fn train(categories: &BTreeMap<u32, Vec<u32>>, documents: &[SparseVector]) -> Self {
        let built: Vec<(u32, SparseVector)> = categories
            .par_iter()
            .filter_map(|(&label, members)| {
                let vectors: Vec<&SparseVector> = members
                    .iter()
                    .filter_map(|&doc| documents.get(doc as usize))
                    .collect();
                if vectors.len() < members.len() {
                    warn!(
                        label,
                        missing = members.len() - vectors.len(),
                        "member ids outside the collection"
                    );
                }
                if vectors.is_empty() {
                    return None;
                }
                let mut centroid = SparseVector::sum(vectors);
                centroid.normalize_l2();
                Some((label, centroid))
            })
            .collect();

        let (labels, centroids): (Vec<u32>, Vec<SparseVector>) = built.into_iter().unzip();
        Self::from_parts(centroids, labels)
    }

    fn from_parts(centroids: Vec<SparseVector>, labels: Vec<u32>) -> Self {
        debug_assert_eq!(centroids.len(), labels.len());
        Self {
            labels,
            index: InvertedIndex::build(Arc::from(centroids)),
        }
    }

    /// Top-`k` labels by centroid similarity, most similar first.
    pub fn predict(&self, query: &SparseVector, k: usize) -> Vec<u32> {
        self.predict_scored(query, k)
            .into_iter()
            .map(|hit| hit.id)
            .collect()
    }

    /// Like [`predict`](Self::predict) but keeps similarities; `Hit::id` is the label id.
    pub fn predict_scored(&self, query: &SparseVector, k: usize) -> Vec<Hit> {
        self.index
            .knn(query, k)
            .into_iter()
            .map(|hit| Hit {
                id: self.labels[hit.id as usize],
                score: hit.score,
            })
            .collect()
    }

    /// `(label, centroid)` pairs in centroid order.
    pub fn centroids(&self) -> impl Iterator<Item = (u32, &SparseVector)> + '_ {
        self.labels.iter().copied().zip(self.index.documents())
    }

    /// Centroid of `label`, if one was built.
    pub fn centroid(&self, label: u32) -> Option<&SparseVector> {
        self.centroids()
            .find(|&(l, _)| l == label)
            .map(|(_, centroid)| centroid)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn index(&self) -> &InvertedIndex {
        &self.index
    }

    fn encode<W: Write>(&self, w: &mut ArtifactWriter<W>) -> PersistenceResult<()> {
        let centroids = self.index.documents();
        w.write_len(centroids.len())?;
        for centroid in centroids {
            w.write_len(centroid.len())?;
            for (feature, weight) in centroid.iter() {
                w.write_feature_id(feature)?;
                w.write_f32(weight)?;
            }
        }
        w.write_len(self.labels.len())?;
        for &label in &self.labels {
            w.write_id(label)?;
        }
        Ok(())
    }

    fn decode<R: Read>(r: &mut ArtifactReader<R>) -> PersistenceResult<Self> {
        // Smallest centroid record is its own length prefix.
        let count = r.read_len("centroid count", LEN_BYTES)?;
        let mut centroids = Vec::with_capacity(count);
        for _ in 0..count {
            let entries = r.read_len("centroid entry count", ID_BYTES + WEIGHT_BYTES)?;
            let mut pairs = Vec::with_capacity(entries);
            for _ in 0..entries {
                let feature = r.read_feature_id("centroid feature id")?;
                let weight = r.read_f32("centroid weight")?;
                pairs.push((feature, weight));
            }
            centroids.push(SparseVector::from_pairs(pairs));
        }
        let label_count = r.read_len("label count", ID_BYTES)?;
        if label_count != count {
            return Err(PersistenceError::Format(format!(
                "{ARTIFACT}: {count} centroids but {label_count} labels"
            )));
        }
        let mut labels = Vec::with_capacity(label_count);
        for _ in 0..label_count {
            labels.push(r.read_id("label id")?);
        }
        r.expect_end()?;
        Ok(Self::from_parts(centroids, labels))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> PersistenceResult<()> {
        let path = path.as_ref();
        let mut w = codec::create(path)?;
        self.encode(&mut w)?;
        w.finish()?;
        info!(path = %path.display(), centroids = self.len(), "saved centroid model");
        Ok(())
    }

    /// Load centroids and rebuild the index over them.
    pub fn load(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let path = path.as_ref();
        let model = Self::decode(&mut codec::open(path, ARTIFACT)?)?;
        info!(path = %path.display(), centroids = model.len(), "loaded centroid model");
        Ok(model)
    }

    pub fn to_bytes(&self) -> PersistenceResult<Vec<u8>> {
        let mut w = ArtifactWriter::new(Vec::new());
        self.encode(&mut w)?;
        w.finish()
    }

    pub fn from_bytes(bytes: &[u8]) -> PersistenceResult<Self> {
        Self::decode(&mut codec::from_bytes(bytes, ARTIFACT))
    }
}

impl CandidateGenerator for CentroidClassifier {
    fn candidates(&self, query: &SparseVector, k: usize) -> Vec<u32> {
        self.predict(query, k)
    }
}
