//! Retry middleware for guarded calls.
//!
//! Re-issues a failed call after a fixed delay plus random jitter, up to
//! `max_retries` extra attempts. Retrying stops early once the next delay
//! would overrun the cumulative budget, measured from the first failure.
//! Only errors for which [`ResilienceError::is_retryable`] holds are retried.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use rand::Rng;
use tokio::time::Instant;
use tower::{Layer, Service, ServiceExt};
use tracing::debug;

use super::BoxedFuture;
use crate::service::config::RetryConfig;
use crate::service::operation::ResilienceError;

// ---------------------------------------------------------------------------
// RetryLayer
// ---------------------------------------------------------------------------

/// Tower layer that retries failed calls of the wrapped service.
#[derive(Debug, Clone)]
pub struct RetryLayer {
    config: Arc<RetryConfig>,
}

impl RetryLayer {
    #[must_use]
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl<S> Layer<S> for RetryLayer {
    type Service = RetryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RetryService {
            inner,
            config: Arc::clone(&self.config),
        }
    }
}

// ---------------------------------------------------------------------------
// RetryService
// ---------------------------------------------------------------------------

/// Service wrapper that owns the retry loop for each call.
#[derive(Debug, Clone)]
pub struct RetryService<S> {
    inner: S,
    config: Arc<RetryConfig>,
}

impl<S, Req> Service<Req> for RetryService<S>
where
    S: Service<Req, Error = ResilienceError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    Req: Clone + Send + 'static,
{
    type Response = S::Response;
    type Error = ResilienceError;
    type Future = BoxedFuture<S::Response>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        // Hand the ready service to the future and keep a fresh clone.
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let config = Arc::clone(&self.config);
        Box::pin(call_with_retry(inner, req, config))
    }
}

async fn call_with_retry<S, Req>(
    mut inner: S,
    req: Req,
    config: Arc<RetryConfig>,
) -> Result<S::Response, ResilienceError>
where
    S: Service<Req, Error = ResilienceError>,
    Req: Clone,
{
    let budget = Duration::from_millis(config.max_duration_ms);
    let mut retries = 0u32;
    let mut first_failure: Option<Instant> = None;

    loop {
        let result = ServiceExt::<Req>::ready(&mut inner)
            .await?
            .call(req.clone())
            .await;

        let err = match result {
            Ok(response) => {
                if retries > 0 {
                    debug!(retries, "call succeeded after retry");
                }
                return Ok(response);
            }
            Err(err) => err,
        };

        if !err.is_retryable() || retries >= config.max_retries {
            return Err(err);
        }

        let since_first_failure = first_failure.get_or_insert_with(Instant::now).elapsed();
        let delay = retry_delay(&config);
        if since_first_failure + delay > budget {
            debug!(
                retries,
                budget_ms = config.max_duration_ms,
                error = %err,
                "retry budget exhausted"
            );
            return Err(err);
        }

        retries += 1;
        #[allow(clippy::cast_possible_truncation)]
        let delay_ms = delay.as_millis() as u64;
        debug!(
            attempt = retries + 1,
            delay_ms,
            error = %err,
            "retrying after failure"
        );
        tokio::time::sleep(delay).await;
    }
}

/// Base delay plus a uniformly random jitter in `0..=jitter_ms`.
fn retry_delay(config: &RetryConfig) -> Duration {
    let jitter_ms = if config.jitter_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=config.jitter_ms)
    };
    Duration::from_millis(config.delay_ms + jitter_ms)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::author::AuthorError;
    use crate::service::middleware::TimeoutLayer;

    /// Fails the first `failures` calls, then succeeds. Each call takes `delay_ms`.
    #[derive(Clone)]
    struct FlakyService {
        failures: u32,
        delay_ms: u64,
        calls: Arc<AtomicU32>,
    }

    impl FlakyService {
        fn new(failures: u32, delay_ms: u64) -> Self {
            Self {
                failures,
                delay_ms,
                calls: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    impl Service<()> for FlakyService {
        type Response = u32;
        type Error = ResilienceError;
        type Future = BoxedFuture<u32>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: ()) -> Self::Future {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            let failures = self.failures;
            let delay = self.delay_ms;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                if call <= failures {
                    Err(ResilienceError::Remote(AuthorError::Unavailable(format!(
                        "call {call}"
                    ))))
                } else {
                    Ok(call)
                }
            })
        }
    }

    fn no_jitter() -> RetryConfig {
        RetryConfig {
            jitter_ms: 0,
            ..RetryConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_without_retry() {
        let flaky = FlakyService::new(0, 0);
        let calls = Arc::clone(&flaky.calls);
        let resp = RetryLayer::new(no_jitter()).layer(flaky).oneshot(()).await.unwrap();
        assert_eq!(resp, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success_with_fixed_delay() {
        let flaky = FlakyService::new(2, 0);
        let calls = Arc::clone(&flaky.calls);
        let start = Instant::now();

        let resp = RetryLayer::new(no_jitter()).layer(flaky).oneshot(()).await.unwrap();

        assert_eq!(resp, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(800));
        assert!(waited < Duration::from_millis(810));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_retries() {
        let flaky = FlakyService::new(10, 0);
        let calls = Arc::clone(&flaky.calls);

        let err = RetryLayer::new(no_jitter()).layer(flaky).oneshot(()).await.unwrap_err();

        assert!(matches!(err, ResilienceError::Remote(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn jitter_stays_within_bound() {
        let flaky = FlakyService::new(1, 0);
        let start = Instant::now();

        RetryLayer::new(RetryConfig::default())
            .layer(flaky)
            .oneshot(())
            .await
            .unwrap();

        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(400));
        assert!(waited <= Duration::from_millis(701));
    }

    #[tokio::test(start_paused = true)]
    async fn budget_stops_retries_early() {
        // Each failed attempt takes 1500ms. At the second failure 1900ms have
        // passed since the first one, so another 400ms delay still fits the
        // 3000ms budget; at the third failure 3800ms have passed.
        let flaky = FlakyService::new(10, 1500);
        let calls = Arc::clone(&flaky.calls);
        let config = RetryConfig {
            max_retries: 5,
            ..no_jitter()
        };

        let err = RetryLayer::new(config).layer(flaky).oneshot(()).await.unwrap_err();

        assert!(matches!(err, ResilienceError::Remote(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_attempt_is_retried() {
        let slow = FlakyService::new(0, 6000);
        let calls = Arc::clone(&slow.calls);

        // Retry around a per-attempt timeout: every attempt takes 6000ms and is
        // abandoned at 5000ms, so the first failure triggers exactly one retry
        // before the 3000ms budget runs out.
        let svc = RetryLayer::new(no_jitter())
            .layer(TimeoutLayer::new(5000).layer(slow));
        let start = Instant::now();
        let err = svc.oneshot(()).await.unwrap_err();

        assert!(matches!(err, ResilienceError::Timeout { timeout_ms: 5000 }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(10_400));
        assert!(waited < Duration::from_millis(10_410));
    }

    #[tokio::test(start_paused = true)]
    async fn rejections_are_not_retried() {
        #[derive(Clone)]
        struct Rejecting(Arc<AtomicU32>);

        impl Service<()> for Rejecting {
            type Response = ();
            type Error = ResilienceError;
            type Future = BoxedFuture<()>;

            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, _req: ()) -> Self::Future {
                self.0.fetch_add(1, Ordering::SeqCst);
                Box::pin(async { Err(ResilienceError::CircuitOpen) })
            }
        }

        let calls = Arc::new(AtomicU32::new(0));
        let err = RetryLayer::new(no_jitter())
            .layer(Rejecting(Arc::clone(&calls)))
            .oneshot(())
            .await
            .unwrap_err();

        assert!(matches!(err, ResilienceError::CircuitOpen));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
