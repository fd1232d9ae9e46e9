//! Error type shared by every stage of the indexing and ranking pipeline.

use crate::DocId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Gram size outside {1, 2, 3}.
    #[error("invalid gram size: {0} (expected 1, 2 or 3)")]
    InvalidGramSize(usize),

    #[error("invalid max jump: {0} (expected at most {})", crate::config::MAX_JUMP)]
    InvalidJump(usize),

    /// Scoring needs at least one document in the corpus.
    #[error("corpus has no documents")]
    EmptyCorpus,

    /// A gram batch handed to the weighting engine spans several documents.
    #[error("mismatched document id: expected {expected}, got {found}")]
    MismatchedDocument { expected: DocId, found: DocId },

    /// Indexing met a token that was never registered in the term table.
    #[error("token not in term table: {0:?}")]
    UnknownToken(String),

    #[error("document not registered: {0}")]
    UnregisteredDocument(String),

    /// Two corpus files map to the same document name.
    #[error("duplicate document name: {0}")]
    DuplicateDocument(String),

    #[error("document not found: {0}")]
    UnknownDocument(DocId),

    /// The corpus in memory was indexed for a different gram table.
    #[error("corpus not indexed for {0}")]
    NotIndexed(crate::persist::GramTable),

    #[error("no scorable terms")]
    NoScorableTerms,

    /// Produced and reference rankings do not describe the same documents.
    #[error("ranking mismatch: {0}")]
    RankingMismatch(String),

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("store version {found} not supported (expected {expected})")]
    IncompatibleStore { found: u32, expected: u32 },

    /// A stored row is shorter than its table layout requires.
    #[error("corrupt row in {0}")]
    CorruptRow(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] sled::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, Error>;
