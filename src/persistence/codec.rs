//! Little-endian scalar codec shared by every artifact.
//!
//! All artifacts are a flat sequence of fixed-width scalars:
//!
//! ```text
//! u64  length prefixes
//! i32  feature / label / document ids
//! f32  weights, idf values, biases
//! ```
//!
//! There is no header or version; any layout change is a breaking change.
//!
//! The reader tracks how many bytes remain in the artifact and checks every
//! length prefix against it before allocating, so a corrupted count fails with
//! [`PersistenceError::Format`] instead of reserving gigabytes.

use crate::persistence::error::{PersistenceError, PersistenceResult};
use crate::sparse::MAX_FEATURE_ID;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Size in bytes of an on-disk id.
pub(crate) const ID_BYTES: u64 = 4;
/// Size in bytes of an on-disk weight.
pub(crate) const WEIGHT_BYTES: u64 = 4;
/// Size in bytes of an on-disk length prefix.
pub(crate) const LEN_BYTES: u64 = 8;

/// Writes scalars in artifact byte order.
pub(crate) struct ArtifactWriter<W: Write> {
    inner: W,
}

impl<W: Write> ArtifactWriter<W> {
    pub(crate) fn new(inner: W) -> Self {
        Self { inner }
    }

    pub(crate) fn write_len(&mut self, len: usize) -> PersistenceResult<()> {
        self.inner.write_all(&(len as u64).to_le_bytes())?;
        Ok(())
    }

    /// Ids are stored as `i32`; anything above `i32::MAX` cannot be represented.
    pub(crate) fn write_id(&mut self, id: u32) -> PersistenceResult<()> {
        let id = i32::try_from(id)
            .map_err(|_| PersistenceError::Format(format!("id {id} does not fit in i32")))?;
        self.inner.write_all(&id.to_le_bytes())?;
        Ok(())
    }

    /// Feature ids above [`MAX_FEATURE_ID`] would not load back.
    pub(crate) fn write_feature_id(&mut self, feature: u32) -> PersistenceResult<()> {
        if feature > MAX_FEATURE_ID {
            return Err(PersistenceError::Format(format!(
                "feature id {feature} exceeds {MAX_FEATURE_ID}"
            )));
        }
        self.write_id(feature)
    }

    pub(crate) fn write_f32(&mut self, value: f32) -> PersistenceResult<()> {
        self.inner.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    pub(crate) fn finish(mut self) -> PersistenceResult<W> {
        self.inner.flush()?;
        Ok(self.inner)
    }
}

/// Reads scalars in artifact byte order, bounded by the artifact size.
pub(crate) struct ArtifactReader<R: Read> {
    inner: R,
    remaining: u64,
    artifact: &'static str,
}

impl<R: Read> ArtifactReader<R> {
    pub(crate) fn new(inner: R, len: u64, artifact: &'static str) -> Self {
        Self {
            inner,
            remaining: len,
            artifact,
        }
    }

    fn truncated(&self, what: &str) -> PersistenceError {
        PersistenceError::Format(format!("{}: truncated while reading {what}", self.artifact))
    }

    fn read_array<const N: usize>(&mut self, what: &str) -> PersistenceResult<[u8; N]> {
        if self.remaining < N as u64 {
            return Err(self.truncated(what));
        }
        let mut buf = [0u8; N];
        match self.inner.read_exact(&mut buf) {
            Ok(()) => {
                self.remaining -= N as u64;
                Ok(buf)
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(self.truncated(what)),
            Err(e) => Err(e.into()),
        }
    }

    /// Read a `u64` length prefix whose elements occupy `element_bytes` each.
    ///
    /// Fails if the declared payload cannot fit in the bytes left in the artifact.
    pub(crate) fn read_len(&mut self, what: &str, element_bytes: u64) -> PersistenceResult<usize> {
        let len = u64::from_le_bytes(self.read_array::<8>(what)?);
        let needed = len.checked_mul(element_bytes);
        match needed {
            Some(needed) if needed <= self.remaining => usize::try_from(len).map_err(|_| {
                PersistenceError::Format(format!(
                    "{}: {what} {len} exceeds address space",
                    self.artifact
                ))
            }),
            _ => Err(PersistenceError::Format(format!(
                "{}: {what} declares {len} elements but only {} bytes remain",
                self.artifact, self.remaining
            ))),
        }
    }

    pub(crate) fn read_id(&mut self, what: &str) -> PersistenceResult<u32> {
        let id = i32::from_le_bytes(self.read_array::<4>(what)?);
        u32::try_from(id).map_err(|_| {
            PersistenceError::Format(format!("{}: negative {what} {id}", self.artifact))
        })
    }

    /// An id that indexes a dense per-feature table, bounded by [`MAX_FEATURE_ID`].
    pub(crate) fn read_feature_id(&mut self, what: &str) -> PersistenceResult<u32> {
        let feature = self.read_id(what)?;
        if feature > MAX_FEATURE_ID {
            return Err(PersistenceError::Format(format!(
                "{}: {what} {feature} exceeds {MAX_FEATURE_ID}",
                self.artifact
            )));
        }
        Ok(feature)
    }

    pub(crate) fn read_f32(&mut self, what: &str) -> PersistenceResult<f32> {
        Ok(f32::from_le_bytes(self.read_array::<4>(what)?))
    }

    /// Fail if the artifact has bytes past the last decoded value.
    pub(crate) fn expect_end(&self) -> PersistenceResult<()> {
        if self.remaining == 0 {
            Ok(())
        } else {
            Err(PersistenceError::Format(format!(
                "{}: {} trailing bytes",
                self.artifact, self.remaining
            )))
        }
    }
}

/// Create (truncate) an artifact file for writing.
pub(crate) fn create(path: &Path) -> PersistenceResult<ArtifactWriter<BufWriter<File>>> {
    let file = File::create(path)?;
    Ok(ArtifactWriter::new(BufWriter::new(file)))
}

/// Open an artifact file, sizing the reader bound from file metadata.
pub(crate) fn open(
    path: &Path,
    artifact: &'static str,
) -> PersistenceResult<ArtifactReader<BufReader<File>>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
            PersistenceError::NotFound(format!("{artifact}: {}: {e}", path.display()))
        }
        _ => PersistenceError::Io(e),
    })?;
    let len = file.metadata()?.len();
    Ok(ArtifactReader::new(BufReader::new(file), len, artifact))
}

/// Reader over an in-memory artifact.
pub(crate) fn from_bytes<'a>(
    bytes: &'a [u8],
    artifact: &'static str,
) -> ArtifactReader<&'a [u8]> {
    ArtifactReader::new(bytes, bytes.len() as u64, artifact)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalars_are_little_endian() {
        let mut w = ArtifactWriter::new(Vec::new());
        w.write_len(2).unwrap();
        w.write_id(7).unwrap();
        w.write_f32(1.5).unwrap();
        let bytes = w.finish().unwrap();

        assert_eq!(&bytes[..8], &[2, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[7, 0, 0, 0]);
        assert_eq!(&bytes[12..16], &1.5f32.to_le_bytes());
    }

    #[test]
    fn oversized_length_prefix_is_rejected_before_allocation() {
        let bytes = u64::MAX.to_le_bytes();
        let mut r = from_bytes(&bytes, "test");
        let err = r.read_len("entry count", ID_BYTES).unwrap_err();
        assert!(err.is_format(), "{err}");
    }

    #[test]
    fn short_scalar_is_a_format_error() {
        let bytes = [1u8, 2];
        let mut r = from_bytes(&bytes, "test");
        assert!(r.read_f32("bias").unwrap_err().is_format());
    }

    #[test]
    fn negative_id_is_a_format_error() {
        let bytes = (-3i32).to_le_bytes();
        let mut r = from_bytes(&bytes, "test");
        assert!(r.read_id("label id").unwrap_err().is_format());
    }

    #[test]
    fn trailing_bytes_are_reported() {
        let bytes = [0u8; 6];
        let mut r = from_bytes(&bytes, "test");
        r.read_f32("weight").unwrap();
        assert!(r.expect_end().unwrap_err().is_format());
        r.read_array::<2>("pad").unwrap();
        r.expect_end().unwrap();
    }

    #[test]
    fn id_above_i32_is_not_written() {
        let mut w = ArtifactWriter::new(Vec::new());
        assert!(w.write_id(u32::MAX).unwrap_err().is_format());
    }

    #[test]
    fn feature_ids_are_bounded_both_ways() {
        let mut w = ArtifactWriter::new(Vec::new());
        w.write_feature_id(MAX_FEATURE_ID).unwrap();
        assert!(w.write_feature_id(MAX_FEATURE_ID + 1).unwrap_err().is_format());

        let bytes = i32::MAX.to_le_bytes();
        let mut r = from_bytes(&bytes, "test");
        assert!(r.read_feature_id("feature id").unwrap_err().is_format());

        let bytes = (MAX_FEATURE_ID as i32).to_le_bytes();
        let mut r = from_bytes(&bytes, "test");
        assert_eq!(r.read_feature_id("feature id").unwrap(), MAX_FEATURE_ID);
    }
}
