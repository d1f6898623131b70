//! Fallback middleware for guarded calls.
//!
//! When the wrapped service fails for any reason, the request is handed to a
//! separate fallback service. The fallback is called directly and is never
//! routed back through the guarded stack. A failing fallback surfaces as
//! `ResilienceError::FallbackFailed`.

use std::task::{Context, Poll};

use tower::{Layer, Service, ServiceExt};
use tracing::warn;

use super::BoxedFuture;
use crate::service::operation::ResilienceError;

// ---------------------------------------------------------------------------
// FallbackLayer
// ---------------------------------------------------------------------------

/// Tower layer that substitutes a fallback result for a failed call.
///
/// With no fallback configured the layer passes errors through unchanged.
#[derive(Debug, Clone)]
pub struct FallbackLayer<F> {
    fallback: Option<F>,
}

impl<F> FallbackLayer<F> {
    #[must_use]
    pub fn new(fallback: F) -> Self {
        Self {
            fallback: Some(fallback),
        }
    }

    #[must_use]
    pub fn optional(fallback: Option<F>) -> Self {
        Self { fallback }
    }
}

impl<S, F: Clone> Layer<S> for FallbackLayer<F> {
    type Service = FallbackService<S, F>;

    fn layer(&self, inner: S) -> Self::Service {
        FallbackService {
            inner,
            fallback: self.fallback.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// FallbackService
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FallbackService<S, F> {
    inner: S,
    fallback: Option<F>,
}

impl<S, F, Req> Service<Req> for FallbackService<S, F>
where
    S: Service<Req, Error = ResilienceError> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    F: Service<Req, Response = S::Response, Error = ResilienceError> + Clone + Send + 'static,
    F::Future: Send + 'static,
    Req: Clone + Send + 'static,
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
        let fallback = self.fallback.clone().map(|svc| (svc, req.clone()));
        Box::pin(async move {
            let result = match ServiceExt::<Req>::ready(&mut inner).await {
                Ok(svc) => svc.call(req).await,
                Err(err) => Err(err),
            };
            let err = match result {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };
            let Some((fallback, req)) = fallback else {
                return Err(err);
            };

            warn!(kind = err.kind(), error = %err, "guarded call failed, serving fallback");
            fallback
                .oneshot(req)
                .await
                .map_err(|fallback_err| ResilienceError::FallbackFailed(Box::new(fallback_err)))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
