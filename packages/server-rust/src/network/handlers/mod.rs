//! HTTP handler definitions for the catalog server.
//!
//! Defines `AppState` (the shared state carried through axum extractors)
//! and re-exports the handler functions used to build the router.

pub mod books;
pub mod health;

pub use books::{
    create_book, delete_book, get_book, list_books, list_enriched_books, update_book, ApiError,
    DEGRADED_HEADER,
};
pub use health::{health_handler, liveness_handler, readiness_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::service::CatalogService;

/// Shared application state passed to all axum handlers via `State` extraction.
///
/// Holds `Arc` references to shared resources so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Record operations and the guarded enriched listing.
    pub catalog: Arc<CatalogService>,
    /// Lifecycle state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Server process start time, used for uptime calculation.
    pub start_time: Instant,
}
