//! Bulkhead middleware for guarded calls.
//!
//! Limits concurrent calls with a semaphore and lets a bounded number of
//! extra callers wait for a permit. Callers beyond the wait queue are
//! rejected immediately with `ResilienceError::BulkheadFull`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower::{Layer, Service, ServiceExt};
use tracing::warn;

use super::BoxedFuture;
use crate::service::config::BulkheadConfig;
use crate::service::operation::ResilienceError;

// ---------------------------------------------------------------------------
// Bulkhead
// ---------------------------------------------------------------------------

/// Shared admission state: running permits plus the wait-queue counter.
///
/// Cloning shares the same state, so every clone of a guarded service
/// draws from one pool.
#[derive(Debug, Clone)]
pub struct Bulkhead {
    semaphore: Arc<Semaphore>,
    waiting: Arc<AtomicUsize>,
    max_concurrent: usize,
    max_waiting: usize,
}

impl Bulkhead {
    #[must_use]
    pub fn new(config: &BulkheadConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            waiting: Arc::new(AtomicUsize::new(0)),
            max_concurrent: config.max_concurrent,
            max_waiting: config.max_waiting,
        }
    }

    /// Calls currently holding a permit.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.max_concurrent
            .saturating_sub(self.semaphore.available_permits())
    }

    /// Callers currently queued for a permit.
    #[must_use]
    pub fn waiting(&self) -> usize {
        self.waiting.load(Ordering::Acquire)
    }

    /// Takes a permit, waiting in the queue if one is free, or rejects.
    async fn acquire(&self) -> Result<OwnedSemaphorePermit, ResilienceError> {
        if let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() {
            return Ok(permit);
        }

        let Some(_slot) = QueueSlot::reserve(&self.waiting, self.max_waiting) else {
            warn!(
                max_concurrent = self.max_concurrent,
                max_waiting = self.max_waiting,
                "bulkhead full, rejecting call"
            );
            return Err(self.rejection());
        };

        // The semaphore is never closed, so this only fails if that changes.
        Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| self.rejection())
    }

    fn rejection(&self) -> ResilienceError {
        ResilienceError::BulkheadFull {
            max_concurrent: self.max_concurrent,
            max_waiting: self.max_waiting,
        }
    }
}

/// RAII reservation of one wait-queue slot.
///
/// Released when the caller obtains a permit or gives up (future dropped).
struct QueueSlot {
    waiting: Arc<AtomicUsize>,
}

impl QueueSlot {
    fn reserve(waiting: &Arc<AtomicUsize>, max_waiting: usize) -> Option<Self> {
        waiting
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |w| {
                (w < max_waiting).then_some(w + 1)
            })
            .ok()
            .map(|_| Self {
                waiting: Arc::clone(waiting),
            })
    }
}

impl Drop for QueueSlot {
    fn drop(&mut self) {
        self.waiting.fetch_sub(1, Ordering::AcqRel);
    }
}

// ---------------------------------------------------------------------------
// BulkheadLayer
// ---------------------------------------------------------------------------

/// Tower layer that admits calls through a shared [`Bulkhead`].
#[derive(Debug, Clone)]
pub struct BulkheadLayer {
    bulkhead: Bulkhead,
}

impl BulkheadLayer {
    #[must_use]
    pub fn new(bulkhead: Bulkhead) -> Self {
        Self { bulkhead }
    }
}

impl<S> Layer<S> for BulkheadLayer {
    type Service = BulkheadService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        BulkheadService {
            inner,
            bulkhead: self.bulkhead.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// BulkheadService
// ---------------------------------------------------------------------------

/// Service wrapper that holds a bulkhead permit for the whole inner call.
#[derive(Debug, Clone)]
pub struct BulkheadService<S> {
    inner: S,
    bulkhead: Bulkhead,
}

impl<S, Req> Service<Req> for BulkheadService<S>
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
        let bulkhead = self.bulkhead.clone();
        Box::pin(async move {
            let permit = bulkhead.acquire().await?;
            // Hold the permit for the duration of the call.
            let result = ServiceExt::<Req>::ready(&mut inner).await?.call(req).await;
            drop(permit);
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    /// Service that holds for a configurable duration.
    #[derive(Clone)]
    struct SlowService {
        delay_ms: u64,
    }

    impl Service<()> for SlowService {
        type Response = ();
        type Error = ResilienceError;
        type Future = BoxedFuture<()>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, _req: ()) -> Self::Future {
            let delay = self.delay_ms;
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(delay)).await;
                Ok(())
            })
        }
    }

    fn bulkhead(max_concurrent: usize, max_waiting: usize) -> Bulkhead {
        Bulkhead::new(&BulkheadConfig {
            max_concurrent,
            max_waiting,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn allows_calls_under_limit() {
        let svc = BulkheadLayer::new(bulkhead(5, 10)).layer(SlowService { delay_ms: 1 });
        svc.oneshot(()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_when_running_and_queue_are_full() {
        let shared = bulkhead(5, 10);
        let svc = BulkheadLayer::new(shared.clone()).layer(SlowService { delay_ms: 1000 });

        let mut handles = Vec::new();
        for _ in 0..15 {
            handles.push(tokio::spawn(svc.clone().oneshot(())));
        }

        // Give the spawned tasks time to acquire permits or queue.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(shared.in_flight(), 5);
        assert_eq!(shared.waiting(), 10);

        let err = svc.clone().oneshot(()).await.unwrap_err();
        assert!(matches!(
            err,
            ResilienceError::BulkheadFull {
                max_concurrent: 5,
                max_waiting: 10
            }
        ));

        // Every admitted or queued caller eventually completes.
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(shared.in_flight(), 0);
        assert_eq!(shared.waiting(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_caller_runs_once_permit_frees() {
        let shared = bulkhead(1, 1);
        let svc = BulkheadLayer::new(shared.clone()).layer(SlowService { delay_ms: 100 });

        let first = tokio::spawn(svc.clone().oneshot(()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = tokio::spawn(svc.clone().oneshot(()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(shared.waiting(), 1);

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
        assert_eq!(shared.waiting(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_caller_frees_its_permit() {
        let shared = bulkhead(1, 0);
        let svc = BulkheadLayer::new(shared.clone()).layer(SlowService { delay_ms: 1000 });

        let abandoned =
            tokio::time::timeout(Duration::from_millis(50), svc.clone().oneshot(())).await;
        assert!(abandoned.is_err());
        assert_eq!(shared.in_flight(), 0);

        svc.oneshot(()).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_queue_rejects_immediately() {
        let shared = bulkhead(1, 0);
        let svc = BulkheadLayer::new(shared.clone()).layer(SlowService { delay_ms: 1000 });

        let _running = tokio::spawn(svc.clone().oneshot(()));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let err = svc.oneshot(()).await.unwrap_err();
        assert!(err.is_rejection());
    }
}
