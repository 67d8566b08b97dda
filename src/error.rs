//! Error taxonomy for the outage pipeline.
//!
//! Every variant is contained at city granularity: the batch records it in
//! the city's outcome and moves on to the next city.

use std::path::PathBuf;

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("missing input: {}", path.display())]
    MissingInput { path: PathBuf },

    #[error("malformed input {}: {reason}", path.display())]
    MalformedInput { path: PathBuf, reason: String },

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("insufficient label diversity: {0}")]
    InsufficientLabelDiversity(String),

    #[error("model fit failure: {0}")]
    ModelFitFailure(String),

    #[error("failed to write {}: {source}", path.display())]
    OutputWriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PipelineError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PipelineError::MalformedInput {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn write_failure(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::OutputWriteFailure {
            path: path.into(),
            source,
        }
    }
}
