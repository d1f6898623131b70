//! Circuit-breaker middleware for guarded calls.
//!
//! Tracks the outcomes of admitted calls in a rolling window. Once the window
//! holds `request_volume_threshold` outcomes and the failure ratio reaches
//! `failure_ratio`, the circuit opens and calls fail fast with
//! `ResilienceError::CircuitOpen`. After `delay_ms` the circuit half-opens and
//! admits trial calls; `success_threshold` consecutive successes close it, a
//! single failure re-opens it. Outcomes of calls admitted before the latest
//! open or close are ignored.

use std::collections::VecDeque;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tower::{Layer, Service, ServiceExt};
use tracing::{debug, info, warn};

use super::BoxedFuture;
use crate::service::config::CircuitBreakerConfig;
use crate::service::operation::ResilienceError;

// ---------------------------------------------------------------------------
// CircuitState
// ---------------------------------------------------------------------------

/// Admission state of a [`CircuitBreaker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

// ---------------------------------------------------------------------------
// CircuitBreaker
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    /// Most recent outcomes while closed, `true` for a failure.
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
    half_open_successes: u32,
    /// Bumped on every open and close; outcomes carry the value they were
    /// admitted under.
    generation: u64,
}

/// Process-wide breaker state shared by every clone of a guarded service.
///
/// Starts closed with an empty window. All reads and updates go through one
/// lock, so admission decisions always see the latest recorded outcome.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        let window = VecDeque::with_capacity(config.request_volume_threshold);
        Self {
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                window,
                opened_at: None,
                half_open_successes: 0,
                generation: 0,
            }),
        }
    }

    /// Current state. An open circuit whose delay has elapsed reports
    /// `HalfOpen` even before the next call arrives.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock();
        match inner.state {
            CircuitState::Open if self.delay_elapsed(&inner) => CircuitState::HalfOpen,
            state => state,
        }
    }

    /// Failure ratio over the current window, `0.0` when empty.
    #[must_use]
    pub fn failure_ratio(&self) -> f64 {
        ratio(&self.inner.lock().window)
    }

    /// Admits or rejects a call, moving an expired open circuit to half-open.
    ///
    /// Returns the generation the call was admitted under; pass it back to
    /// [`record_at`](Self::record_at) once the call settles.
    ///
    /// # Errors
    ///
    /// Returns `ResilienceError::CircuitOpen` while the circuit is open.
    pub fn try_acquire(&self) -> Result<u64, ResilienceError> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => Ok(inner.generation),
            CircuitState::Open if self.delay_elapsed(&inner) => {
                inner.state = CircuitState::HalfOpen;
                inner.half_open_successes = 0;
                info!(state = "half_open", "circuit half-open, admitting trial calls");
                Ok(inner.generation)
            }
            CircuitState::Open => {
                warn!(state = "open", "call rejected by circuit breaker");
                Err(ResilienceError::CircuitOpen)
            }
        }
    }

    /// Records a success against the current generation.
    pub fn record_success(&self) {
        let generation = self.inner.lock().generation;
        self.settle(generation, false);
    }

    /// Records a failure against the current generation.
    pub fn record_failure(&self) {
        let generation = self.inner.lock().generation;
        self.settle(generation, true);
    }

    /// Records the outcome of a call admitted under `generation`.
    ///
    /// Rejections are not outcomes of the guarded call and leave the window
    /// untouched. Outcomes from an earlier generation are ignored.
    pub fn record_at<T>(&self, generation: u64, result: &Result<T, ResilienceError>) {
        match result {
            Ok(_) => self.settle(generation, false),
            Err(err) if err.is_rejection() => {}
            Err(_) => self.settle(generation, true),
        }
    }

    fn settle(&self, generation: u64, failed: bool) {
        let mut inner = self.inner.lock();
        if generation != inner.generation {
            debug!(generation, current = inner.generation, "stale outcome ignored");
            return;
        }
        match (inner.state, failed) {
            (CircuitState::Closed, false) => self.push_outcome(&mut inner, false),
            (CircuitState::Closed, true) => {
                self.push_outcome(&mut inner, true);
                let failure_ratio = ratio(&inner.window);
                if inner.window.len() >= self.config.request_volume_threshold
                    && failure_ratio >= self.config.failure_ratio
                {
                    warn!(
                        state = "open",
                        failure_ratio,
                        window = inner.window.len(),
                        "circuit opened"
                    );
                    Self::trip(&mut inner);
                }
            }
            (CircuitState::HalfOpen, false) => {
                inner.half_open_successes += 1;
                if inner.half_open_successes >= self.config.success_threshold {
                    Self::close(&mut inner);
                    info!(state = "closed", "circuit closed");
                }
            }
            (CircuitState::HalfOpen, true) => {
                warn!(state = "open", "trial call failed, circuit re-opened");
                Self::trip(&mut inner);
            }
            // Nothing is admitted while open.
            (CircuitState::Open, _) => {}
        }
    }

    /// Forces the circuit closed with an empty window.
    pub fn reset(&self) {
        Self::close(&mut self.inner.lock());
    }

    fn push_outcome(&self, inner: &mut BreakerState, failed: bool) {
        inner.window.push_back(failed);
        while inner.window.len() > self.config.request_volume_threshold {
            inner.window.pop_front();
        }
    }

    fn delay_elapsed(&self, inner: &BreakerState) -> bool {
        inner
            .opened_at
            .is_some_and(|at| at.elapsed() >= Duration::from_millis(self.config.delay_ms))
    }

    fn trip(inner: &mut BreakerState) {
        inner.state = CircuitState::Open;
        inner.generation += 1;
        inner.opened_at = Some(Instant::now());
        inner.half_open_successes = 0;
        inner.window.clear();
    }

    fn close(inner: &mut BreakerState) {
        inner.state = CircuitState::Closed;
        inner.generation += 1;
        inner.opened_at = None;
        inner.half_open_successes = 0;
        inner.window.clear();
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(window: &VecDeque<bool>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let failures = window.iter().filter(|failed| **failed).count();
    failures as f64 / window.len() as f64
}

// ---------------------------------------------------------------------------
// CircuitBreakerLayer
// ---------------------------------------------------------------------------

/// Tower layer that guards the wrapped service with a shared [`CircuitBreaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreakerLayer {
    breaker: Arc<CircuitBreaker>,
}

impl CircuitBreakerLayer {
    #[must_use]
    pub fn new(breaker: Arc<CircuitBreaker>) -> Self {
        Self { breaker }
    }
}

impl<S> Layer<S> for CircuitBreakerLayer {
    type Service = CircuitBreakerService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CircuitBreakerService {
            inner,
            breaker: Arc::clone(&self.breaker),
        }
    }
}

// ---------------------------------------------------------------------------
// CircuitBreakerService
// ---------------------------------------------------------------------------

/// Service wrapper that fails fast while open and records each outcome.
#[derive(Debug, Clone)]
pub struct CircuitBreakerService<S> {
    inner: S,
    breaker: Arc<CircuitBreaker>,
}

impl<S, Req> Service<Req> for CircuitBreakerService<S>
where
    S: Service<Req, Error = ResilienceError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = ResilienceError;
    type Future = BoxedFuture<S::Response>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let breaker = Arc::clone(&self.breaker);
        Box::pin(async move {
            let generation = breaker.try_acquire()?;
            let result = match ServiceExt::<Req>::ready(&mut inner).await {
                Ok(svc) => svc.call(req).await,
                Err(err) => Err(err),
            };
            breaker.record_at(generation, &result);
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use super::*;
    use crate::author::AuthorError;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig::default())
    }

    fn trip(breaker: &CircuitBreaker) {
        for _ in 0..10 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    /// Counts calls and fails while `failing` is set.
    #[derive(Clone)]
    struct Toggle {
        failing: Arc<AtomicBool>,
        calls: Arc<AtomicU32>,
    }

    impl Toggle {
        fn new(failing: bool) -> Self {
            Self {
                failing: Arc::new(AtomicBool::new(failing)),
                calls: Arc::new(AtomicU32::new(0)),
            }
        }
    }

    impl Service<()> for Toggle {
        type Response = ();
        type Error = ResilienceError;
        type Future = BoxedFuture<()>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: ()) -> Self::Future {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let failing = self.failing.load(Ordering::SeqCst);
            Box::pin(async move {
                if failing {
                    Err(ResilienceError::Remote(AuthorError::NotFound { id: 1 }))
                } else {
                    Ok(())
                }
            })
        }
    }

    #[test]
    fn starts_closed_with_empty_window() {
        let breaker = breaker();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.failure_ratio().abs() < f64::EPSILON);
        assert!(breaker.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn stays_closed_below_volume_threshold() {
        let breaker = breaker();
        for _ in 0..9 {
            breaker.record_failure();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn opens_when_ratio_reaches_threshold() {
        let breaker = breaker();
        for _ in 0..7 {
            breaker.record_success();
        }
        for _ in 0..3 {
            breaker.record_failure();
        }
        // 3 of 10 failed.
        assert_eq!(breaker.state(), CircuitState::Closed);

        // The oldest success rolls out: 4 of 10.
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(matches!(
            breaker.try_acquire(),
            Err(ResilienceError::CircuitOpen)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn half_opens_after_delay_and_closes_on_successes() {
        let breaker = breaker();
        trip(&breaker);

        tokio::time::advance(Duration::from_millis(4999)).await;
        assert!(breaker.try_acquire().is_err());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(breaker.try_acquire().is_ok());

        breaker.record_success();
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.failure_ratio().abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens() {
        let breaker = breaker();
        trip(&breaker);

        tokio::time::advance(Duration::from_millis(5000)).await;
        assert!(breaker.try_acquire().is_ok());
        breaker.record_success();
        breaker.record_failure();

        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.try_acquire().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_admitted_before_opening_are_ignored() {
        let breaker = breaker();
        let before_open = breaker.try_acquire().unwrap();
        trip(&breaker);

        tokio::time::advance(Duration::from_millis(5000)).await;
        let trial = breaker.try_acquire().unwrap();
        assert_ne!(before_open, trial);

        breaker.record_at(before_open, &Ok::<(), ResilienceError>(()));
        breaker.record_at(before_open, &Ok::<(), ResilienceError>(()));
        breaker.record_at(
            before_open,
            &Err::<(), _>(ResilienceError::Timeout { timeout_ms: 5000 }),
        );
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        for _ in 0..2 {
            breaker.record_at(trial, &Ok::<(), ResilienceError>(()));
        }
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_at(trial, &Ok::<(), ResilienceError>(()));
        assert_eq!(breaker.state(), CircuitState::Closed);

        // A trial call settling after the close does not enter the window.
        breaker.record_at(
            trial,
            &Err::<(), _>(ResilienceError::Timeout { timeout_ms: 5000 }),
        );
        assert!(breaker.failure_ratio().abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_closes_the_circuit() {
        let breaker = breaker();
        trip(&breaker);
        breaker.reset();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.try_acquire().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn open_circuit_skips_inner_service() {
        let breaker = Arc::new(breaker());
        let toggle = Toggle::new(true);
        let calls = Arc::clone(&toggle.calls);
        let svc = CircuitBreakerLayer::new(Arc::clone(&breaker)).layer(toggle);

        for _ in 0..10 {
            let err = svc.clone().oneshot(()).await.unwrap_err();
            assert!(matches!(err, ResilienceError::Remote(_)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 10);

        let err = svc.clone().oneshot(()).await.unwrap_err();
        assert!(matches!(err, ResilienceError::CircuitOpen));
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_through_trial_calls() {
        let breaker = Arc::new(breaker());
        let toggle = Toggle::new(true);
        let failing = Arc::clone(&toggle.failing);
        let svc = CircuitBreakerLayer::new(Arc::clone(&breaker)).layer(toggle);

        for _ in 0..10 {
            let _ = svc.clone().oneshot(()).await;
        }
        assert_eq!(breaker.state(), CircuitState::Open);

        failing.store(false, Ordering::SeqCst);
        tokio::time::advance(Duration::from_millis(5000)).await;
        for _ in 0..3 {
            svc.clone().oneshot(()).await.unwrap();
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn rejections_are_not_counted() {
        #[derive(Clone)]
        struct AlwaysFull;

        impl Service<()> for AlwaysFull {
            type Response = ();
            type Error = ResilienceError;
            type Future = BoxedFuture<()>;

            fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
                Poll::Ready(Ok(()))
            }

            fn call(&mut self, _req: ()) -> Self::Future {
                Box::pin(async {
                    Err(ResilienceError::BulkheadFull {
                        max_concurrent: 5,
                        max_waiting: 10,
                    })
                })
            }
        }

        let breaker = Arc::new(breaker());
        let svc = CircuitBreakerLayer::new(Arc::clone(&breaker)).layer(AlwaysFull);
        for _ in 0..20 {
            assert!(svc.clone().oneshot(()).await.is_err());
        }
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.failure_ratio().abs() < f64::EPSILON);
    }
}
