//! Metrics middleware for guarded calls.
//!
//! Records call duration and outcome using `tracing` spans, not a full
//! metrics crate. Sits outermost, so the recorded outcome is the one the
//! caller sees: `degraded` when the fallback answered.

use std::task::{Context, Poll};

use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::{info_span, Instrument};

use super::BoxedFuture;
use crate::service::operation::ResilienceError;

/// Responses that can report whether they came from a degraded path.
pub trait Outcome {
    fn outcome(&self) -> &'static str;
}

impl Outcome for catalog_core::Catalog {
    fn outcome(&self) -> &'static str {
        if self.is_degraded() {
            "degraded"
        } else {
            "ok"
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsLayer
// ---------------------------------------------------------------------------

/// Tower layer that instruments calls with timing and outcome via `tracing` spans.
#[derive(Debug, Clone)]
pub struct MetricsLayer {
    operation: &'static str,
}

impl MetricsLayer {
    #[must_use]
    pub fn new(operation: &'static str) -> Self {
        Self { operation }
    }
}

impl<S> Layer<S> for MetricsLayer {
    type Service = MetricsService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        MetricsService {
            inner,
            operation: self.operation,
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsService
// ---------------------------------------------------------------------------

/// Service wrapper that records call duration and outcome in tracing spans.
#[derive(Debug, Clone)]
pub struct MetricsService<S> {
    inner: S,
    operation: &'static str,
}

impl<S, Req> Service<Req> for MetricsService<S>
where
    S: Service<Req, Error = ResilienceError> + Send,
    S::Future: Send + 'static,
    S::Response: Outcome + Send + 'static,
{
    type Response = S::Response;
    type Error = ResilienceError;
    type Future = BoxedFuture<S::Response>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let operation = self.operation;
        let span = info_span!(
            "guarded_call",
            operation,
            duration_ms = tracing::field::Empty,
            outcome = tracing::field::Empty,
        );

        let fut = self.inner.call(req);

        Box::pin(
            async move {
                let start = Instant::now();
                let result = fut.await;

                let outcome = match &result {
                    Ok(response) => response.outcome(),
                    Err(err) => err.kind(),
                };

                #[allow(clippy::cast_possible_truncation)]
                let duration_ms = start.elapsed().as_millis() as u64;
                tracing::Span::current().record("duration_ms", duration_ms);
                tracing::Span::current().record("outcome", outcome);

                tracing::info!(operation, duration_ms, outcome, "guarded call complete");

                result
            }
            .instrument(span),
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
