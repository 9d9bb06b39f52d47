//! Persistent per-document candidate lists.
//!
//! Retrieval is the expensive stage; caching its output lets the rerankers be
//! retrained any number of times without touching the centroid index.

use crate::persistence::codec::{self, ArtifactReader, ArtifactWriter, ID_BYTES, LEN_BYTES};
use crate::persistence::PersistenceResult;
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::info;

const ARTIFACT: &str = "retrieval cache";

/// Smallest on-disk entry: document id plus list length.
const MIN_ENTRY_BYTES: u64 = ID_BYTES + LEN_BYTES;

/// Ordered candidate label ids; short enough to live inline in practice.
pub type CandidateList = SmallVec<[u32; 16]>;

/// Document id → candidate labels, behind a single mutex.
#[derive(Debug, Default)]
pub struct RetrievalCache {
    entries: Mutex<BTreeMap<u32, CandidateList>>,
}

impl RetrievalCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u32, CandidateList>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the candidates for `doc`, replacing any previous list.
    pub fn put(&self, doc: u32, candidates: &[u32]) {
        self.lock().insert(doc, SmallVec::from_slice(candidates));
    }

    pub fn get(&self, doc: u32) -> Option<CandidateList> {
        self.lock().get(&doc).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Cached document ids, ascending.
    pub fn documents(&self) -> Vec<u32> {
        self.lock().keys().copied().collect()
    }

    fn encode<W: Write>(&self, w: &mut ArtifactWriter<W>) -> PersistenceResult<()> {
        let entries = self.lock();
        w.write_len(entries.len())?;
        for (&doc, candidates) in entries.iter() {
            w.write_id(doc)?;
            w.write_len(candidates.len())?;
            for &label in candidates {
                w.write_id(label)?;
            }
        }
        Ok(())
    }

    fn decode<R: Read>(r: &mut ArtifactReader<R>) -> PersistenceResult<Self> {
        let count = r.read_len("entry count", MIN_ENTRY_BYTES)?;
        let mut entries = BTreeMap::new();
        for _ in 0..count {
            let doc = r.read_id("document id")?;
            let len = r.read_len("candidate count", ID_BYTES)?;
            let mut candidates = CandidateList::with_capacity(len);
            for _ in 0..len {
                candidates.push(r.read_id("candidate label")?);
            }
            entries.insert(doc, candidates);
        }
        r.expect_end()?;
        Ok(Self {
            entries: Mutex::new(entries),
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> PersistenceResult<()> {
        let path = path.as_ref();
        let mut w = codec::create(path)?;
        self.encode(&mut w)?;
        w.finish()?;
        info!(path = %path.display(), documents = self.len(), "saved retrieval cache");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let path = path.as_ref();
        let cache = Self::decode(&mut codec::open(path, ARTIFACT)?)?;
        info!(path = %path.display(), documents = cache.len(), "loaded retrieval cache");
        Ok(cache)
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

    #[test]
    fn get_returns_exact_list_or_none() {
        let cache = RetrievalCache::new();
        cache.put(5, &[7, 9, 2]);
        assert_eq!(cache.get(5).as_deref(), Some(&[7, 9, 2][..]));
        assert!(cache.get(6).is_none());
    }

    #[test]
    fn bytes_round_trip_keeps_order_within_lists() {
        let cache = RetrievalCache::new();
        cache.put(2, &[30, 10, 20]);
        cache.put(0, &[]);
        cache.put(9, &(0..40u32).rev().collect::<Vec<_>>());
        let loaded = RetrievalCache::from_bytes(&cache.to_bytes().unwrap()).unwrap();
        assert_eq!(loaded.documents(), vec![0, 2, 9]);
        for doc in loaded.documents() {
            assert_eq!(loaded.get(doc), cache.get(doc));
        }
    }

    #[test]
    fn declared_count_beyond_payload_is_rejected() {
        let cache = RetrievalCache::new();
        cache.put(1, &[1, 2, 3]);
        let mut bytes = cache.to_bytes().unwrap();
        // Inflate the list length of the single entry.
        bytes[12..20].copy_from_slice(&1_000_000u64.to_le_bytes());
        assert!(RetrievalCache::from_bytes(&bytes).unwrap_err().is_format());
    }
}
