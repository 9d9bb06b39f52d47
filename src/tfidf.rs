//! TF-IDF vectorization.
//!
//! Raw term counts `c` become `ln(c + 1) * idf[f]`, then the vector is scaled
//! to unit L2 norm. The idf table is dense by feature id:
//!
//! ```text
//! idf[f]   = β + ln(N / (df[f] + 1))
//! zero_idf = β + ln(N)                 (features beyond the trained range)
//! ```
//!
//! `β = 5` keeps every idf positive even for features present in all documents.

use crate::persistence::codec::{self, ArtifactReader, ArtifactWriter, WEIGHT_BYTES};
use crate::persistence::PersistenceResult;
use crate::sparse::SparseVector;
use rayon::prelude::*;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

/// Additive idf smoothing.
pub const IDF_SMOOTHING: f64 = 5.0;

const ARTIFACT: &str = "vectorizer weights";

/// Trained idf table.
#[derive(Debug, Clone, PartialEq)]
pub struct TfidfVectorizer {
    idf: Vec<f32>,
    zero_idf: f32,
}

impl TfidfVectorizer {
    /// Compute document frequencies over `corpus` and derive idf values.
    pub fn train(corpus: &[SparseVector]) -> Self {
        let docs = corpus.len() as f64;
        let mut df: Vec<f64> = Vec::new();
        for doc in corpus {
            for feature in doc.features() {
                let slot = feature as usize;
                if slot >= df.len() {
                    df.resize(slot + 1, 0.0);
                }
                df[slot] += 1.0;
            }
        }
        let idf = df
            .into_iter()
            .map(|df| (IDF_SMOOTHING + (docs / (df + 1.0)).ln()) as f32)
            .collect();
        Self {
            idf,
            zero_idf: (IDF_SMOOTHING + docs.ln()) as f32,
        }
    }

    /// Idf for `feature`, falling back to `zero_idf` beyond the trained range.
    pub fn idf(&self, feature: u32) -> f32 {
        self.idf
            .get(feature as usize)
            .copied()
            .unwrap_or(self.zero_idf)
    }

    pub fn zero_idf(&self) -> f32 {
        self.zero_idf
    }

    /// Number of feature slots in the idf table.
    pub fn vocabulary_len(&self) -> usize {
        self.idf.len()
    }

    /// Reweight and normalize one vector in place.
    pub fn transform(&self, vector: &mut SparseVector) {
        for (feature, w) in vector.weights_mut() {
            let tf = (f64::from(*w) + 1.0).ln() as f32;
            *w = tf * self.idf(feature);
        }
        vector.normalize_l2();
    }

    /// Transform every document; documents are independent so this runs on the pool.
    pub fn transform_all(&self, collection: &mut [SparseVector]) {
        collection.par_iter_mut().for_each(|v| self.transform(v));
    }

    fn encode<W: Write>(&self, w: &mut ArtifactWriter<W>) -> PersistenceResult<()> {
        w.write_len(self.idf.len())?;
        for &idf in &self.idf {
            w.write_f32(idf)?;
        }
        w.write_f32(self.zero_idf)
    }

    fn decode<R: Read>(r: &mut ArtifactReader<R>) -> PersistenceResult<Self> {
        let len = r.read_len("idf length", WEIGHT_BYTES)?;
        let mut idf = Vec::with_capacity(len);
        for _ in 0..len {
            idf.push(r.read_f32("idf value")?);
        }
        let zero_idf = r.read_f32("zero idf")?;
        r.expect_end()?;
        Ok(Self { idf, zero_idf })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> PersistenceResult<()> {
        let path = path.as_ref();
        let mut w = codec::create(path)?;
        self.encode(&mut w)?;
        w.finish()?;
        info!(path = %path.display(), features = self.idf.len(), "saved vectorizer weights");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let path = path.as_ref();
        let vectorizer = Self::decode(&mut codec::open(path, ARTIFACT)?)?;
        info!(path = %path.display(), features = vectorizer.idf.len(), "loaded vectorizer weights");
        Ok(vectorizer)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<SparseVector> {
        vec![
            SparseVector::from_pairs([(0, 1.0), (2, 3.0)]),
            SparseVector::from_pairs([(0, 2.0)]),
            SparseVector::from_pairs([(1, 1.0), (2, 1.0)]),
        ]
    }

    #[test]
    fn idf_follows_smoothed_formula() {
        let v = TfidfVectorizer::train(&corpus());
        let n = 3.0f64;
        assert!((v.idf(0) as f64 - (5.0 + (n / 3.0).ln())).abs() < 1e-5);
        assert!((v.idf(1) as f64 - (5.0 + (n / 2.0).ln())).abs() < 1e-5);
        assert!((v.zero_idf() as f64 - (5.0 + n.ln())).abs() < 1e-5);
        assert_eq!(v.idf(99), v.zero_idf());
        assert!(v.idf(0) > 0.0);
    }

    #[test]
    fn transform_normalizes() {
        let v = TfidfVectorizer::train(&corpus());
        let mut q = SparseVector::from_pairs([(0, 1.0), (2, 5.0), (40, 1.0)]);
        v.transform(&mut q);
        assert!((q.energy() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_counts_stay_zero() {
        let v = TfidfVectorizer::train(&corpus());
        let mut q = SparseVector::from_pairs([(0, 0.0)]);
        v.transform(&mut q);
        assert_eq!(q.get(0), 0.0);
    }

    #[test]
    fn parallel_transform_matches_serial() {
        let v = TfidfVectorizer::train(&corpus());
        let mut serial = corpus();
        for doc in &mut serial {
            v.transform(doc);
        }
        let mut parallel = corpus();
        v.transform_all(&mut parallel);
        assert_eq!(serial, parallel);
    }

    #[test]
    fn bytes_round_trip() {
        let v = TfidfVectorizer::train(&corpus());
        let loaded = TfidfVectorizer::from_bytes(&v.to_bytes().unwrap()).unwrap();
        assert_eq!(v, loaded);
    }

    #[test]
    fn truncated_weights_fail_cleanly() {
        let v = TfidfVectorizer::train(&corpus());
        let bytes = v.to_bytes().unwrap();
        for cut in [0, 4, 8, bytes.len() - 1] {
            let err = TfidfVectorizer::from_bytes(&bytes[..cut]).unwrap_err();
            assert!(err.is_format(), "cut {cut}: {err}");
        }
    }
}
