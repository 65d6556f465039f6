use std::time::Duration;
use thiserror::Error;

/// Errors raised by the ingestion stages.
///
/// Each variant maps to one failure class of the pipeline. Transient classes
/// (unreachable API or store, timeouts, artifact not yet written) are reported
/// by [`PipelineError::is_retryable`]; retrying them is the caller's job.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The market-data API could not be reached or answered with a transient status.
    #[error("market data API unavailable: {0}")]
    ApiUnavailable(String),

    /// A network or storage call exceeded its time budget.
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    /// The upstream payload is not the JSON we expect.
    #[error("parse error: {0}")]
    Parse(String),

    /// The chart response carried no result for the symbol.
    #[error("no chart data for {symbol}: {reason}")]
    DataUnavailable { symbol: String, reason: String },

    /// The serialized record handed to the persister is unusable.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// The object store could not be reached.
    #[error("object store unavailable: {0}")]
    StorageUnavailable(String),

    /// The object store rejected the request.
    #[error("object store {op} failed: {msg}")]
    Storage { op: &'static str, msg: String },

    /// Bucket creation lost a race against another creator.
    #[error("bucket {0} already exists")]
    BucketAlreadyExists(String),

    /// A storage path that is not `<bucket>/<symbol>`.
    #[error("invalid storage path {0:?}")]
    InvalidPath(String),

    /// No formatted CSV exists under the expected prefix yet.
    #[error("no formatted csv under {bucket}/{prefix}")]
    ArtifactNotFound { bucket: String, prefix: String },

    /// The formatting container could not be run or exited non-zero.
    #[error("format job failed: {0}")]
    FormatJob(String),
}

impl PipelineError {
    /// Whether a later attempt of the same stage may succeed without upstream changes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::ApiUnavailable(_)
                | PipelineError::Timeout { .. }
                | PipelineError::StorageUnavailable(_)
                | PipelineError::ArtifactNotFound { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
