//! Error taxonomy for the tuner.
//!
//! Only two families of failure are errors at all:
//!
//! | Family              | Examples                                         | When            |
//! |---------------------|--------------------------------------------------|-----------------|
//! | Input inconsistency | empty candidate set, slot count mismatch         | load time       |
//! | Configuration       | unknown metric/strategy, malformed weight file   | startup         |
//!
//! Degenerate numerics (zero L1 norm, zero softmax mass) are recovered where they
//! happen and only logged. Running out of iteration budget is a normal stop.
//! A worker thread that panics is reported as [`TuneError::WorkerFailed`] and
//! aborts the run.

use std::path::PathBuf;

/// Result alias used across the library.
pub type Result<T, E = TuneError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum TuneError {
    // === Input inconsistency ===
    /// A slot has no candidates. Points at an upstream generation bug.
    #[error("candidate set for slot {slot} is empty; the upstream generator produced no output for it")]
    EmptyCandidateSet { slot: usize },

    /// The corpus has no slots at all.
    #[error("corpus is empty")]
    EmptyCorpus,

    /// Two companion corpora disagree on the number of slots.
    #[error("incompatible candidate lists: {expected} slots vs {found} slots")]
    SlotCountMismatch { expected: usize, found: usize },

    /// A line of an n-best file could not be parsed.
    #[error("malformed n-best entry at {}:{line}: {detail}", path.display())]
    MalformedNbest {
        path: PathBuf,
        line: usize,
        detail: String,
    },

    // === Configuration ===
    /// A line of a weight file could not be parsed.
    #[error("malformed weight file {}:{line}: {detail}", path.display())]
    MalformedWeights {
        path: PathBuf,
        line: usize,
        detail: String,
    },

    #[error("unknown metric '{0}' (expected quality, bleu[:N], smooth-bleu[:N] or a '+' combination)")]
    UnknownMetric(String),

    #[error("unknown optimizer strategy '{0}' (expected koehn, coordinate, random, better or mcmc)")]
    UnknownStrategy(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("no initial weight vector was supplied")]
    NoInitialWeights,

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Runtime ===
    /// A search worker panicked while optimizing a starting point.
    #[error("search worker failed while optimizing starting point {point}")]
    WorkerFailed { point: usize },
}

impl TuneError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
