//! Error types for pipeline runs.
//!
//! Every error here is fatal to the run: the pipeline is a performance
//! optimization over an otherwise-correct sequential baseline, so a failure
//! indicates corrupt input or a broken invariant, never a condition to
//! degrade gracefully for. The library surfaces a single error to the caller
//! rather than terminating the process itself; the binary turns it into one
//! diagnostic line and a non-zero exit status.

use std::io;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error type for pipeline operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Reading or decoding the input stream failed.
    #[error("{input}: {source}")]
    Source {
        /// Name of the offending input (file path or `<stdin>`).
        input: String,
        /// The underlying read/decode error.
        source: io::Error,
    },

    /// A transformation failed on an individual item.
    #[error("{stage}: {source}")]
    Transform {
        /// Name of the failing transform stage.
        stage: &'static str,
        /// The underlying transform error.
        source: io::Error,
    },

    /// Writing a completed result to the output sink failed.
    #[error("write output: {0}")]
    Sink(io::Error),

    /// The run was cut short by a failure on the other thread.
    ///
    /// Raised only for the thread that was blocked in a queue wait when its
    /// peer failed; the peer's error is the one reported to the caller.
    #[error("pipeline aborted by a failure on the other thread")]
    Aborted,

    /// The worker thread panicked.
    #[error("worker thread panicked")]
    WorkerPanic,
}

impl PipelineError {
    /// Whether this is the secondary `Aborted` error rather than the failure
    /// that actually stopped the run.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        matches!(self, PipelineError::Aborted)
    }
}
