//! Concurrent collection of trained rerankers.

use crate::binary::BinaryClassifier;
use crate::persistence::codec::{
    self, ArtifactReader, ArtifactWriter, ID_BYTES, LEN_BYTES, WEIGHT_BYTES,
};
use crate::persistence::PersistenceResult;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

const ARTIFACT: &str = "classifier store";

/// Smallest on-disk model record: label id, weight count, bias.
const MIN_RECORD_BYTES: u64 = ID_BYTES + LEN_BYTES + WEIGHT_BYTES;

/// Label id → reranker, shared by many per-label training tasks.
///
/// One mutex guards the map. Tasks write disjoint labels, so the lock only
/// serializes access to the map itself.
#[derive(Debug, Default)]
pub struct ClassifierStore {
    models: Mutex<BTreeMap<u32, Arc<BinaryClassifier>>>,
}

impl ClassifierStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u32, Arc<BinaryClassifier>>> {
        // Entries are independent; a panicked writer cannot leave one half-written.
        self.models.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store the model for `label`, replacing any previous one.
    pub fn set(&self, label: u32, model: BinaryClassifier) {
        self.lock().insert(label, Arc::new(model));
    }

    /// Shared handle to the model for `label`.
    pub fn get(&self, label: u32) -> Option<Arc<BinaryClassifier>> {
        self.lock().get(&label).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Stored label ids, ascending.
    pub fn labels(&self) -> Vec<u32> {
        self.lock().keys().copied().collect()
    }

    /// Sum of nonzero weights over every model.
    pub fn total_nonzero_weights(&self) -> usize {
        self.lock().values().map(|m| m.nonzero_weight_count()).sum()
    }

    fn encode<W: Write>(&self, w: &mut ArtifactWriter<W>) -> PersistenceResult<()> {
        let models = self.lock();
        w.write_len(models.len())?;
        for (&label, model) in models.iter() {
            w.write_id(label)?;
            model.encode(w)?;
        }
        Ok(())
    }

    fn decode<R: Read>(r: &mut ArtifactReader<R>) -> PersistenceResult<Self> {
        let count = r.read_len("model count", MIN_RECORD_BYTES)?;
        let mut models = BTreeMap::new();
        for _ in 0..count {
            let label = r.read_id("label id")?;
            models.insert(label, Arc::new(BinaryClassifier::decode(r)?));
        }
        r.expect_end()?;
        Ok(Self {
            models: Mutex::new(models),
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> PersistenceResult<()> {
        let path = path.as_ref();
        let mut w = codec::create(path)?;
        self.encode(&mut w)?;
        w.finish()?;
        info!(
            path = %path.display(),
            models = self.len(),
            weights = self.total_nonzero_weights(),
            "saved classifier store"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let path = path.as_ref();
        let store = Self::decode(&mut codec::open(path, ARTIFACT)?)?;
        info!(path = %path.display(), models = store.len(), "loaded classifier store");
        Ok(store)
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
    use crate::sparse::SparseVector;
    use rayon::prelude::*;

    fn model(seed: u32) -> BinaryClassifier {
        BinaryClassifier::from_parts(
            SparseVector::from_pairs([(seed, 0.5), (seed + 1, -0.25)]),
            seed as f32 * 0.1,
        )
    }

    #[test]
    fn concurrent_writers_on_disjoint_labels() {
        let store = ClassifierStore::new();
        (0..200u32).into_par_iter().for_each(|label| store.set(label, model(label)));
        assert_eq!(store.len(), 200);
        assert_eq!(store.get(17).as_deref(), Some(&model(17)));
        assert!(store.get(500).is_none());
    }

    #[test]
    fn bytes_round_trip() {
        let store = ClassifierStore::new();
        for label in [3, 1, 40] {
            store.set(label, model(label));
        }
        let loaded = ClassifierStore::from_bytes(&store.to_bytes().unwrap()).unwrap();
        assert_eq!(loaded.labels(), vec![1, 3, 40]);
        for label in loaded.labels() {
            assert_eq!(loaded.get(label), store.get(label));
        }
    }

    #[test]
    fn short_payload_is_a_format_error() {
        let store = ClassifierStore::new();
        store.set(1, model(1));
        let bytes = store.to_bytes().unwrap();
        for cut in [3, 8, 12, bytes.len() - 2] {
            assert!(ClassifierStore::from_bytes(&bytes[..cut]).unwrap_err().is_format());
        }
    }
}
