//! Timeout middleware for guarded calls.
//!
//! Fails any single attempt that exceeds the configured bound with
//! `ResilienceError::Timeout`. The attempt's future is dropped, so a late
//! result is discarded.

use std::task::{Context, Poll};
use std::time::Duration;

use tower::{Layer, Service};
use tracing::warn;

use super::BoxedFuture;
use crate::service::operation::ResilienceError;

// ---------------------------------------------------------------------------
// TimeoutLayer
// ---------------------------------------------------------------------------

/// Tower layer that bounds each call of the wrapped service.
#[derive(Debug, Clone)]
pub struct TimeoutLayer {
    timeout_ms: u64,
}

impl TimeoutLayer {
    #[must_use]
    pub fn new(timeout_ms: u64) -> Self {
        Self { timeout_ms }
    }
}

impl<S> Layer<S> for TimeoutLayer {
    type Service = TimeoutService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TimeoutService {
            inner,
            timeout_ms: self.timeout_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// TimeoutService
// ---------------------------------------------------------------------------

/// Service wrapper that enforces the attempt timeout.
#[derive(Debug, Clone)]
pub struct TimeoutService<S> {
    inner: S,
    timeout_ms: u64,
}

impl<S, Req> Service<Req> for TimeoutService<S>
where
    S: Service<Req, Error = ResilienceError> + Send,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
{
    type Response = S::Response;
    type Error = ResilienceError;
    type Future = BoxedFuture<S::Response>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let timeout_ms = self.timeout_ms;
        let fut = self.inner.call(req);
        Box::pin(async move {
            let duration = Duration::from_millis(timeout_ms);
            match tokio::time::timeout(duration, fut).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    warn!(timeout_ms, "attempt abandoned after timeout");
                    Err(ResilienceError::Timeout { timeout_ms })
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
