//! mertune - Minimum error rate training for linear rerankers
//!
//! Tunes the weights of a linear model over fixed n-best candidate lists so
//! that the candidates it ranks first score as well as possible under a
//! corpus-level metric (BLEU, an external quality score, or a mix).
//!
//! # Architecture
//!
//! ```text
//! n-best file → Corpus → Metric check → Starting points → Workers → GlobalBest → weight file
//!      ↓           ↓          ↓               ↓              ↓           ↓
//!   parser     interned   required       seeded RNG     line search  compare-
//!              features    stats        (ChaCha8)      + strategies  and-replace
//! ```
//!
//! # Search
//!
//! - Exact line search: the metric along `w + t·d` is piecewise constant, so
//!   every breakpoint is enumerated and scored with one incremental sweep
//! - Incremental metrics aggregate through a segment tree, making incremental
//!   and from-scratch scores bit-identical
//! - Optional Gibbs-sampled expected metric with L2 regularization
//! - Multi-start search over a fixed pool of scoped threads

pub mod config;
pub mod corpus;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod search;
pub mod weights;

pub use config::TuneConfig;
pub use corpus::{Candidate, CandidateId, CandidateSet, Corpus, CorpusBuilder};
pub use error::{Result, TuneError};
pub use metrics::{check_corpus, EvaluationMetric, IncrementalMetric, MetricSpec};
pub use search::{
    evaluate_at, GlobalBest, LineSearchConfig, LineSearcher, McmcConfig, McmcEstimator, OptimizerStrategy,
    TuneOutcome, TuneReport, Tuner,
};
pub use weights::WeightVector;
