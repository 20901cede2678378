//! # Error Module
//!
//! Error types for the signing pipeline.
//!
//! ## Design Principles
//! - **Never panic** on a runtime path - return errors instead
//! - **One error per run** - the first failure wins, siblings are cancelled
//! - **Name the culprit** - stage names and primitive names travel with the error

use thiserror::Error;

/// Top-level pipeline error
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors raised by the hash primitives
#[derive(Error, Debug)]
pub enum SignerError {
    #[error("{primitive} overheated: {in_flight} calls were in flight at once")]
    Overheat {
        primitive: &'static str,
        in_flight: usize,
    },

    #[error("{primitive} failed on input {input:?}: {reason}")]
    Failed {
        primitive: &'static str,
        input: String,
        reason: String,
    },
}

/// Errors raised by the executor or by a stage's lifecycle
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Stage '{stage}' produced {found} values where {expected} were expected")]
    ShapeMismatch {
        stage: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Stage '{stage}' panicked")]
    Panicked { stage: &'static str },

    #[error("Failed to spawn a worker for stage '{stage}': {source}")]
    Spawn {
        stage: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build the worker pool for stage '{stage}': {reason}")]
    WorkerPool { stage: &'static str, reason: String },

    #[error("Pipeline did not finish within {timeout_ms} ms")]
    DeadlineExceeded { timeout_ms: u64 },

    #[error("Pipeline was cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Whether this error only reports that the run was wound down.
    ///
    /// Stages that stop because a sibling failed return `Cancelled`; the
    /// executor prefers the sibling's error over these.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PipelineError::Stage(StageError::Cancelled))
    }
}

/// Convenience Result type alias
pub type Result<T> = std::result::Result<T, PipelineError>;
