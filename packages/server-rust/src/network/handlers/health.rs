//! Health, liveness, and readiness endpoint handlers.
//!
//! The detailed health body also reports the enrichment guard: circuit
//! state and bulkhead occupancy.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;
use crate::network::HealthState;

/// Returns detailed health information as JSON.
///
/// Always returns 200; the `state` field says whether the server is
/// serving, and an open `circuit` says the listing is degraded.
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let policy = state.catalog.policy();
    let breaker = policy.circuit_breaker();
    let bulkhead = policy.bulkhead();

    Json(json!({
        "state": state.shutdown.health_state().as_str(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "circuit": {
            "state": breaker.state().as_str(),
            "failure_ratio": breaker.failure_ratio(),
        },
        "bulkhead": {
            "in_flight": bulkhead.in_flight(),
            "waiting": bulkhead.waiting(),
        },
    }))
}

/// Liveness probe: always 200 while the process answers.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe: 200 when `Ready`, 503 while starting or draining.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state() == HealthState::Ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use super::*;
    use crate::author::MemoryAuthorClient;
    use crate::network::ShutdownController;
    use crate::service::{CatalogService, ServerConfig};
    use crate::storage::HashMapBookStore;

    fn test_state() -> AppState {
        let catalog = CatalogService::new(
            Arc::new(HashMapBookStore::new()),
            Arc::new(MemoryAuthorClient::new()),
            &ServerConfig::default(),
        );
        AppState {
            catalog: Arc::new(catalog),
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
        }
    }

    #[tokio::test]
    async fn health_handler_reports_server_and_guard_state() {
        let state = test_state();
        state.shutdown.set_ready();

        let json = health_handler(State(state)).await.0;

        assert_eq!(json["state"], "ready");
        assert_eq!(json["in_flight"], 0);
        assert!(json["uptime_secs"].is_number());
        assert_eq!(json["circuit"]["state"], "closed");
        assert_eq!(json["circuit"]["failure_ratio"], 0.0);
        assert_eq!(json["bulkhead"]["in_flight"], 0);
        assert_eq!(json["bulkhead"]["waiting"], 0);
    }

    #[tokio::test]
    async fn health_handler_reports_open_circuit() {
        let state = test_state();
        let breaker = state.catalog.policy().circuit_breaker();
        for _ in 0..10 {
            breaker.record_failure();
        }

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["circuit"]["state"], "open");
    }

    #[tokio::test]
    async fn health_handler_reports_draining_state() {
        let state = test_state();
        state.shutdown.set_ready();
        state.shutdown.trigger_shutdown();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["state"], "draining");
    }

    #[tokio::test]
    async fn liveness_handler_always_returns_200() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_lifecycle() {
        let state = test_state();
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.shutdown.set_ready();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);

        state.shutdown.trigger_shutdown();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
