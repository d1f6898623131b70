//! Tower middleware layers for the guarded enrichment call.
//!
//! - [`timeout`]: Per-attempt timeout enforcement
//! - [`retry`]: Fixed-delay retry with jitter and a cumulative budget
//! - [`bulkhead`]: Semaphore-based concurrency limiting with a bounded wait queue
//! - [`circuit_breaker`]: Rolling-window failure-ratio circuit breaker
//! - [`fallback`]: Substitute result once the guarded call has failed
//! - [`metrics`]: Call timing and outcome via `tracing` spans
//! - [`pipeline`]: Composes all layers into a single service stack

use std::future::Future;
use std::pin::Pin;

use crate::service::operation::ResilienceError;

pub mod bulkhead;
pub mod circuit_breaker;
pub mod fallback;
pub mod metrics;
pub mod pipeline;
pub mod retry;
pub mod timeout;

pub use bulkhead::{Bulkhead, BulkheadLayer};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerLayer, CircuitState};
pub use fallback::FallbackLayer;
pub use metrics::{MetricsLayer, Outcome};
pub use pipeline::ResiliencePolicy;
pub use retry::RetryLayer;
pub use timeout::TimeoutLayer;

/// Future returned by every resilience layer.
pub type BoxedFuture<R> = Pin<Box<dyn Future<Output = Result<R, ResilienceError>> + Send>>;
