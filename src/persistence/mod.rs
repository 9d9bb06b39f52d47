//! Binary persistence for pipeline artifacts.
//!
//! Four artifacts cross stage boundaries: vectorizer weights, the centroid
//! model, the classifier store and the retrieval cache. Each owning type
//! exposes `save`/`load` (file paths) and `to_bytes`/`from_bytes` (in memory);
//! this module holds the shared scalar codec and the error type.
//!
//! # Layouts
//!
//! ```text
//! vectorizer weights  [u64 idf_len][f32 × idf_len][f32 zero_idf]
//! centroid model      [u64 n]
//!                     n × [u64 m][(i32 feature, f32 weight) × m]
//!                     [u64 n][i32 label × n]
//! classifier store    [u64 n]
//!                     n × [i32 label][u64 m][(i32 feature, f32 weight) × m][f32 bias]
//! retrieval cache     [u64 n]
//!                     n × [i32 doc][u64 len][i32 label × len]
//! ```
//!
//! Feature ids are bounded by [`crate::sparse::MAX_FEATURE_ID`] on both sides.
//!
//! A load either returns a fully populated value or an error; nothing is
//! half-filled on failure.

pub(crate) mod codec;
pub mod error;

pub use error::{PersistenceError, PersistenceResult};
