//! Request and error types shared by the enrichment service and every
//! resilience layer.

use crate::author::AuthorError;

/// Request for one enrichment run over the full current record set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichAll;

/// Failure taxonomy of a guarded call.
#[derive(Debug, thiserror::Error)]
pub enum ResilienceError {
    #[error("bulkhead full: {max_concurrent} running and {max_waiting} waiting")]
    BulkheadFull {
        max_concurrent: usize,
        max_waiting: usize,
    },
    #[error("circuit breaker open, call rejected")]
    CircuitOpen,
    #[error("attempt timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("author lookup failed: {0}")]
    Remote(#[from] AuthorError),
    #[error("record store failure: {0}")]
    Store(#[from] anyhow::Error),
    #[error("fallback failed: {0}")]
    FallbackFailed(#[source] Box<ResilienceError>),
}

impl ResilienceError {
    /// Fast-fail rejections: no work was attempted and no retry was consumed.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::BulkheadFull { .. } | Self::CircuitOpen)
    }

    /// Failures raised from inside an attempt, which the retry layer may repeat.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Remote(_) | Self::Store(_))
    }

    /// Short label used in log fields.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BulkheadFull { .. } => "bulkhead_full",
            Self::CircuitOpen => "circuit_open",
            Self::Timeout { .. } => "timeout",
            Self::Remote(_) => "remote_failure",
            Self::Store(_) => "store_failure",
            Self::FallbackFailed(_) => "fallback_failed",
        }
    }
}
