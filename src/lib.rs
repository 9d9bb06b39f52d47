//! lexirank: extreme multi-label classification over sparse text features.
//!
//! A two-stage retrieve-then-rerank system:
//!
//! - `tfidf`: log-count TF-IDF weighting with L2 normalization
//! - `index`: inverted-index top-k search (`knn` exact, `fast_knn` rare-feature first)
//! - `centroid`: one normalized centroid per label, searched by `index`
//! - `knn_vote`: instance-based label voting as an alternative candidate source
//! - `binary` / `store`: per-label logistic-regression rerankers
//! - `cache`: persistent per-document candidate lists between stages
//! - `pipeline`: prefetch, train, validate and predict stages
//!
//! # Critical Nuances
//!
//! ## Retrieval Bounds Accuracy
//!
//! The rerankers only ever see labels the retrieval stage proposed. A label
//! that is not in a document's top `k_predict` centroids cannot be predicted,
//! however good its classifier is. Recall of the candidate stage is the
//! ceiling for the whole system.
//!
//! ## Rare Features Carry the Signal
//!
//! With L2-normalized TF-IDF vectors, common features have long posting lists
//! and tiny weights. `fast_knn` exploits this: searching only the query's rare
//! features touches a small fraction of the postings yet finds nearly the same
//! neighbours, which are then rescored exactly with the full query.
//!
//! ## Scores Are Doubled Dot Products
//!
//! Search scores are `2 · q · d`. For unit vectors this is `2 − ‖q − d‖²`, so
//! ranking by score is ranking by Euclidean distance.
//!
//! ## Negatives Dominate
//!
//! Most documents a label is proposed for do not carry it. Reranker training
//! samples the positive class with a fixed probability instead of in
//! proportion to its size.

pub mod binary;
pub mod cache;
pub mod centroid;
pub mod config;
pub mod corpus;
pub mod evaluation;
pub mod index;
pub mod knn_vote;
pub mod pipeline;
pub mod rerank;
pub mod sparse;
pub mod store;
pub mod tfidf;

pub mod error;
pub mod persistence;

// Re-exports
pub use binary::{BinaryClassifier, RerankerParams};
pub use cache::RetrievalCache;
pub use centroid::CentroidClassifier;
pub use config::PipelineConfig;
pub use corpus::{Corpus, LabelSet};
pub use error::{LexirankError, Result};
pub use index::{Hit, InvertedIndex};
pub use knn_vote::{KnnVoteClassifier, KnnVoteParams};
pub use pipeline::CandidateGenerator;
pub use sparse::SparseVector;
pub use store::ClassifierStore;
pub use tfidf::TfidfVectorizer;
