use thiserror::Error;

/// Failure taxonomy for the pipeline core.
///
/// Transient fetch failures are contained per indicator (the run continues
/// with zero records), analyzer failures are contained per analyzer, and a
/// persistence failure aborts only the batch it occurred in.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("provider request failed: {0}")]
    TransientFetch(#[from] reqwest::Error),

    #[error("malformed provider record: {0}")]
    Validation(String),

    #[error("unresolved {kind} code '{code}'")]
    UnresolvedReference { kind: &'static str, code: String },

    #[error("store operation failed: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("analyzer '{analyzer}' failed: {message}")]
    Analyzer { analyzer: &'static str, message: String },
}

pub type Result<T> = std::result::Result<T, PipelineError>;
