//! Pipeline composition: combines the resilience layers into a single service stack.

use std::sync::Arc;

use tower::{Service, ServiceBuilder};

use super::bulkhead::{Bulkhead, BulkheadLayer};
use super::circuit_breaker::{CircuitBreaker, CircuitBreakerLayer};
use super::fallback::FallbackLayer;
use super::metrics::{MetricsLayer, Outcome};
use super::retry::RetryLayer;
use super::timeout::TimeoutLayer;
use super::BoxedFuture;
use crate::service::config::ResilienceConfig;
use crate::service::operation::ResilienceError;

/// Process-wide resilience state for one guarded operation.
///
/// Owns the circuit breaker and the bulkhead so that every service produced
/// by [`wrap`](Self::wrap) shares one rolling window and one permit pool.
#[derive(Debug)]
pub struct ResiliencePolicy {
    config: ResilienceConfig,
    breaker: Arc<CircuitBreaker>,
    bulkhead: Bulkhead,
}

impl ResiliencePolicy {
    /// Creates the policy with a closed circuit and an idle bulkhead.
    #[must_use]
    pub fn new(config: ResilienceConfig) -> Self {
        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker.clone()));
        let bulkhead = Bulkhead::new(&config.bulkhead);
        Self {
            config,
            breaker,
            bulkhead,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    #[must_use]
    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    #[must_use]
    pub fn bulkhead(&self) -> &Bulkhead {
        &self.bulkhead
    }

    /// Wraps `primary` in the full resilience stack.
    ///
    /// Layer order (outermost to innermost):
    /// 1. `MetricsLayer` -- record timing and the outcome the caller sees
    /// 2. `FallbackLayer` -- serve `fallback` once everything below has failed
    /// 3. `CircuitBreakerLayer` -- fail fast while open, observe admitted outcomes
    /// 4. `BulkheadLayer` -- bound concurrent runs of the retrying unit
    /// 5. `RetryLayer` -- repeat failed attempts within the retry budget
    /// 6. `TimeoutLayer` -- bound each single attempt
    ///
    /// `fallback` is called directly, never through this stack. It is dropped
    /// when `fallback_enabled` is off, letting the final error through.
    #[must_use]
    pub fn wrap<S, F, Req>(
        &self,
        operation: &'static str,
        primary: S,
        fallback: F,
    ) -> impl Service<
        Req,
        Response = S::Response,
        Error = ResilienceError,
        Future = BoxedFuture<S::Response>,
    > + Clone
    + Send
    + Sync
    + 'static
    where
        S: Service<Req, Error = ResilienceError> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
        S::Response: Outcome + Send + 'static,
        F: Service<Req, Response = S::Response, Error = ResilienceError>
            + Clone
            + Send
            + Sync
            + 'static,
        F::Future: Send + 'static,
        Req: Clone + Send + 'static,
    {
        let fallback = self.config.fallback_enabled.then_some(fallback);
        ServiceBuilder::new()
            .layer(MetricsLayer::new(operation))
            .layer(FallbackLayer::optional(fallback))
            .layer(CircuitBreakerLayer::new(Arc::clone(&self.breaker)))
            .layer(BulkheadLayer::new(self.bulkhead.clone()))
            .layer(RetryLayer::new(self.config.retry.clone()))
            .layer(TimeoutLayer::new(self.config.attempt_timeout_ms))
            .service(primary)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
