//! Error types for lexirank.

use crate::corpus::CorpusError;
use crate::persistence::PersistenceError;
use thiserror::Error;

/// Errors surfaced by training, prediction and pipeline stages.
///
/// Search itself is infallible: missing postings or unseen features simply
/// contribute nothing.
#[derive(Debug, Error)]
pub enum LexirankError {
    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A stage was handed a corpus with no documents.
    #[error("corpus is empty")]
    EmptyCorpus,

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(String),

    /// An artifact failed to save or load.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// An input corpus failed to read or parse.
    #[error(transparent)]
    Corpus(#[from] CorpusError),

    /// Writing user-facing output failed.
    #[error("output error: {0}")]
    Output(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LexirankError>;
