//! Failures of the sorting pipeline.

use thiserror::Error;

/// Every error is fatal to the whole pipeline; nothing is retried.
#[derive(Debug, Error)]
pub enum SortError {
    /// The input held no elements.
    #[error("no numbers in input, aborting")]
    EmptyInput,

    /// Fewer stages than `ceil(log2(n) + 1)` were configured.
    #[error("not enough stages to sort {elements} numbers: need {required}, have {available}")]
    InsufficientStages {
        elements: usize,
        required: usize,
        available: usize,
    },

    /// A stage saw a message sequence that breaks the link protocol.
    #[error("stage {stage}: protocol violation: {reason}")]
    Protocol { stage: usize, reason: &'static str },

    /// A neighbour of `stage` went away before end-of-stream.
    #[error("stage {stage}: link to neighbour closed")]
    LinkClosed { stage: usize },

    #[error("stage {stage} panicked")]
    StagePanicked { stage: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SortError {
    /// True for errors that only echo a failure somewhere else in the chain.
    pub fn is_consequential(&self) -> bool {
        matches!(self, SortError::LinkClosed { .. })
    }
}

pub type Result<T, E = SortError> = std::result::Result<T, E>;
