//! Network module with deferred startup lifecycle.
//!
//! `new()` allocates shared state, `start()` binds the TCP listener, and
//! `serve()` accepts requests until the shutdown future resolves. Binding
//! before serving lets the caller learn an OS-assigned port first.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::NetworkConfig;
use super::handlers::{
    create_book, delete_book, get_book, health_handler, list_books, list_enriched_books,
    liveness_handler, readiness_handler, update_book, AppState,
};
use super::middleware::{build_http_layers, request_timeout_layer, track_in_flight};
use super::shutdown::ShutdownController;
use crate::service::CatalogService;

/// Assembles the axum router with all routes and middleware.
///
/// Routes:
/// - `GET /health` -- detailed health JSON
/// - `GET /health/live` -- liveness probe
/// - `GET /health/ready` -- readiness probe
/// - `GET /books`, `POST /books` -- plain listing, insert
/// - `GET /books/all` -- guarded enriched listing
/// - `GET|PUT|DELETE /books/{id}` -- single record
///
/// Every route except `/books/all` is bounded by `request_timeout`.
#[must_use]
pub fn build_router(state: AppState, config: &NetworkConfig) -> Router {
    let in_flight =
        axum::middleware::from_fn_with_state(Arc::clone(&state.shutdown), track_in_flight);

    let bounded: Router<AppState> = Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler))
        .route("/books", get(list_books).post(create_book))
        .route(
            "/books/{id}",
            get(get_book).put(update_book).delete(delete_book),
        )
        .layer(request_timeout_layer(config));

    Router::new()
        .route("/books/all", get(list_enriched_books))
        .merge(bounded)
        .layer(in_flight)
        .layer(build_http_layers(config))
        .with_state(state)
}

/// Manages the HTTP server lifecycle.
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    catalog: Arc<CatalogService>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates the module without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, catalog: Arc<CatalogService>) -> Self {
        Self {
            config,
            listener: None,
            catalog,
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Binds the TCP listener and returns the bound port, which differs
    /// from the configured one when port 0 is used.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves requests until `shutdown` resolves, then waits up to
    /// `drain_timeout` for in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first, or if the server
    /// hits a fatal I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let listener = self
            .listener
            .ok_or_else(|| anyhow::anyhow!("start() must be called before serve()"))?;

        let state = AppState {
            catalog: self.catalog,
            shutdown: Arc::clone(&self.shutdown),
            start_time: Instant::now(),
        };
        let router = build_router(state, &self.config);

        self.shutdown.set_ready();
        info!("serving HTTP requests");

        let controller = Arc::clone(&self.shutdown);
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.await;
                controller.trigger_shutdown();
                info!("shutdown signal received, draining");
            })
            .await?;

        if self.shutdown.wait_for_drain(self.config.drain_timeout).await {
            info!("all in-flight requests drained");
        } else {
            warn!(
                in_flight = self.shutdown.in_flight_count(),
                "drain timeout expired with requests still in flight"
            );
        }
        Ok(())
    }
}
