use thiserror::Error;

/// Domain errors surfaced by the pipeline.
///
/// Public operations return `anyhow::Result`; these values travel inside the
/// `anyhow::Error` so callers can recover them with
/// `err.downcast_ref::<PipelineError>()`.
///
/// Image decode problems are deliberately absent: they are logged and the
/// loader continues with best-effort pixels.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// Invalid construction-time input (empty history, a user with no
    /// observed items, a zero count, a zero image dimension).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Every user drawn within the retry bound had interacted with the whole
    /// item universe, so no negative item could be sampled.
    #[error("no eligible negative item after {attempts} user draws")]
    NoEligibleNegative { attempts: usize },

    /// The loading stage stopped before delivering every sampled record.
    #[error("loading stage failed: {0}")]
    WorkerFailure(String),
}

impl PipelineError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
