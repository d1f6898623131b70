//! HTTP middleware stack for the catalog server.
//!
//! Transport-level layers applied to every route. The first layer listed
//! is the outermost: it sees the request first and the response last.
//! Fault tolerance for the enriched listing lives in
//! [`crate::service::middleware`], not here.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::HeaderName;
use axum::http::{Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use super::config::NetworkConfig;
use super::handlers::DEGRADED_HEADER;
use super::shutdown::ShutdownController;

type HttpLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        CorsLayer,
        tower::layer::util::Stack<
            CompressionLayer,
            tower::layer::util::Stack<
                TraceLayer<
                    tower_http::classify::SharedClassifier<
                        tower_http::classify::ServerErrorsAsFailures,
                    >,
                >,
                tower::layer::util::Stack<
                    SetRequestIdLayer<MakeRequestUuid>,
                    tower::layer::util::Identity,
                >,
            >,
        >,
    >,
>;

/// Builds the HTTP-level Tower middleware stack.
///
/// **Middleware ordering (outermost to innermost):**
/// 1. `SetRequestId` -- assigns a UUID `x-request-id` to every request
/// 2. `Tracing` -- request/response trace spans
/// 3. `Compression` -- gzip response bodies
/// 4. `CORS` -- configured origins, the catalog's methods, degraded marker exposed
/// 5. `PropagateRequestId` -- echoes `x-request-id` on the response
///
/// The request timeout is not part of this stack; see
/// [`request_timeout_layer`].
#[must_use]
pub fn build_http_layers(config: &NetworkConfig) -> HttpLayers {
    let x_request_id = HeaderName::from_static("x-request-id");

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(build_cors_layer(&config.cors_origins))
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}

/// Bounds total processing time, answering `408` when it expires.
///
/// Applied to every route except the guarded listing, whose duration is
/// bounded by the resilience policy and must end in a result or fallback.
#[must_use]
pub fn request_timeout_layer(config: &NetworkConfig) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, config.request_timeout)
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static(DEGRADED_HEADER)])
}

/// Holds an in-flight guard for the lifetime of each request so shutdown
/// can wait for running requests to finish.
pub async fn track_in_flight(
    State(shutdown): State<Arc<ShutdownController>>,
    request: Request,
    next: Next,
) -> Response {
    let _guard = shutdown.in_flight_guard();
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn request_timeout_answers_408() {
        let config = NetworkConfig {
            request_timeout: Duration::from_secs(5),
            ..NetworkConfig::default()
        };
        let router = Router::new()
            .route(
                "/",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    "late"
                }),
            )
            .layer(request_timeout_layer(&config));

        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }

    #[test]
    fn build_cors_layer_specific_origins() {
        let origins = vec![
            "http://localhost:3000".to_string(),
            "https://example.com".to_string(),
        ];
        let _cors = build_cors_layer(&origins);
    }

    #[tokio::test]
    async fn request_id_is_set_and_propagated() {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(build_http_layers(&NetworkConfig::default()));

        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn in_flight_guard_spans_the_request() {
        let shutdown = Arc::new(ShutdownController::new());
        let observed = Arc::clone(&shutdown);
        let router = Router::new()
            .route(
                "/",
                get(move || async move { observed.in_flight_count().to_string() }),
            )
            .layer(axum::middleware::from_fn_with_state(
                Arc::clone(&shutdown),
                track_in_flight,
            ));

        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        assert_eq!(&body[..], b"1");
        assert_eq!(shutdown.in_flight_count(), 0);
    }
}
