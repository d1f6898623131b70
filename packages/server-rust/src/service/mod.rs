//! Catalog operations and the guarded enrichment call.
//!
//! 1. **Enrichment** (`enrichment`): per-record author lookups as a `tower::Service`
//! 2. **Middleware** (`middleware`): Tower layers (timeout, retry, bulkhead,
//!    circuit breaker, fallback, metrics) and the `ResiliencePolicy` composing them
//! 3. **Facade** (`catalog`): store operations plus the guarded listing

pub mod catalog;
pub mod config;
pub mod enrichment;
pub mod middleware;
pub mod operation;

// Re-export key types for convenient access.
pub use catalog::CatalogService;
pub use config::{
    BulkheadConfig, CircuitBreakerConfig, ResilienceConfig, RetryConfig, ServerConfig,
};
pub use enrichment::{EnrichmentPipeline, EnrichmentService, PlainListingService};
pub use middleware::{CircuitState, ResiliencePolicy};
pub use operation::{EnrichAll, ResilienceError};
