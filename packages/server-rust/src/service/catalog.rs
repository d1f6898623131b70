//! Catalog facade used by the HTTP handlers.
//!
//! Plain record operations go straight to the [`BookStore`]. The enriched
//! listing goes through the [`ResiliencePolicy`] stack built once at
//! construction, so every request shares one breaker and one bulkhead.

use std::sync::Arc;

use async_trait::async_trait;
use catalog_core::{BookId, BookPayload, BookRecord, Catalog};
use tower::{Service, ServiceExt};
use tracing::info;

use super::config::ServerConfig;
use super::enrichment::{EnrichmentPipeline, EnrichmentService, PlainListingService};
use super::middleware::ResiliencePolicy;
use super::operation::{EnrichAll, ResilienceError};
use crate::traits::{AuthorClient, BookStore};

/// Object-safe handle on the guarded enrichment service.
#[async_trait]
trait GuardedCall: Send + Sync {
    async fn run(&self) -> Result<Catalog, ResilienceError>;
}

#[async_trait]
impl<S> GuardedCall for S
where
    S: Service<EnrichAll, Response = Catalog, Error = ResilienceError> + Clone + Send + Sync,
    S::Future: Send,
{
    async fn run(&self) -> Result<Catalog, ResilienceError> {
        self.clone().oneshot(EnrichAll).await
    }
}

/// Book catalog operations over one store and one author service.
pub struct CatalogService {
    store: Arc<dyn BookStore>,
    policy: Arc<ResiliencePolicy>,
    enrich: Arc<dyn GuardedCall>,
}

impl CatalogService {
    #[must_use]
    pub fn new(
        store: Arc<dyn BookStore>,
        authors: Arc<dyn AuthorClient>,
        config: &ServerConfig,
    ) -> Self {
        let pipeline = EnrichmentPipeline::new(Arc::clone(&store), authors)
            .with_lookup_concurrency(config.lookup_concurrency);
        let policy = Arc::new(ResiliencePolicy::new(config.resilience.clone()));
        let enrich = policy.wrap(
            "enrich_all",
            EnrichmentService::new(Arc::new(pipeline)),
            PlainListingService::new(Arc::clone(&store)),
        );
        Self {
            store,
            policy,
            enrich: Arc::new(enrich),
        }
    }

    /// The policy guarding [`enrich_all`](Self::enrich_all), for health reporting.
    #[must_use]
    pub fn policy(&self) -> &ResiliencePolicy {
        &self.policy
    }

    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn find_by_id(&self, id: BookId) -> anyhow::Result<Option<BookRecord>> {
        self.store.find_by_id(id).await
    }

    /// Every record, unenriched.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn find_all(&self) -> anyhow::Result<Vec<BookRecord>> {
        self.store.find_all().await
    }

    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub async fn insert(&self, payload: BookPayload) -> anyhow::Result<BookRecord> {
        let book = self.store.insert(payload).await?;
        info!(book_id = book.id, "book inserted");
        Ok(book)
    }

    /// Replaces the record at `id`; any id in the payload is ignored.
    /// Returns `false` when no such record exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the write.
    pub async fn update(&self, id: BookId, payload: BookPayload) -> anyhow::Result<bool> {
        let updated = self.store.update(payload.into_record(id)).await?;
        if updated {
            info!(book_id = id, "book updated");
        }
        Ok(updated)
    }

    /// Returns `false` when no such record exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the delete.
    pub async fn delete(&self, id: BookId) -> anyhow::Result<bool> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            info!(book_id = id, "book deleted");
        }
        Ok(deleted)
    }

    /// Enriched listing through the resilience stack.
    ///
    /// Yields `Catalog::Degraded` when the fallback answered.
    ///
    /// # Errors
    ///
    /// Returns the final [`ResilienceError`] when the fallback is disabled,
    /// or `ResilienceError::FallbackFailed` when the fallback itself failed.
    pub async fn enrich_all(&self) -> Result<Catalog, ResilienceError> {
        self.enrich.run().await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
