//! Author enrichment of the full book listing.
//!
//! [`EnrichmentPipeline`] fetches every record and looks each one up in the
//! author service. [`EnrichmentService`] exposes a run as a
//! `tower::Service<EnrichAll>` so the resilience layers can wrap it, and
//! [`PlainListingService`] is the unguarded degraded path used as fallback.

use std::sync::Arc;
use std::task::{Context, Poll};

use catalog_core::{Catalog, EnrichedBookRecord};
use futures_util::{stream, StreamExt, TryStreamExt};
use tower::Service;
use tracing::debug;

use super::middleware::BoxedFuture;
use super::operation::{EnrichAll, ResilienceError};
use crate::traits::{AuthorClient, BookStore};

// ---------------------------------------------------------------------------
// EnrichmentPipeline
// ---------------------------------------------------------------------------

/// Produces enriched records from the current record set.
///
/// One author lookup is issued per record, keyed by the record's own id
/// (see [`BookRecord::author_lookup_key`](catalog_core::BookRecord::author_lookup_key)).
/// Up to `lookup_concurrency` lookups run at once; output order always
/// matches the store's fetch order. The first failed lookup fails the run.
pub struct EnrichmentPipeline {
    store: Arc<dyn BookStore>,
    authors: Arc<dyn AuthorClient>,
    lookup_concurrency: usize,
}

impl EnrichmentPipeline {
    /// Creates a pipeline issuing lookups sequentially.
    #[must_use]
    pub fn new(store: Arc<dyn BookStore>, authors: Arc<dyn AuthorClient>) -> Self {
        Self {
            store,
            authors,
            lookup_concurrency: 1,
        }
    }

    /// Sets how many lookups a single run may have in flight. Clamped to at least 1.
    #[must_use]
    pub fn with_lookup_concurrency(mut self, lookup_concurrency: usize) -> Self {
        self.lookup_concurrency = lookup_concurrency.max(1);
        self
    }

    /// Runs the enrichment once over every stored record.
    ///
    /// # Errors
    ///
    /// - [`ResilienceError::Store`] if the record set cannot be loaded
    /// - [`ResilienceError::Remote`] if any author lookup fails; the whole
    ///   run fails and no partial listing is returned
    pub async fn enrich_all(&self) -> Result<Vec<EnrichedBookRecord>, ResilienceError> {
        let books = self.store.find_all().await?;
        debug!(
            count = books.len(),
            concurrency = self.lookup_concurrency,
            "enriching book listing"
        );

        let authors = &self.authors;
        stream::iter(books)
            .map(|book| async move {
                let author = authors.find_by_id(book.author_lookup_key()).await?;
                debug!(book_id = book.id, "author resolved");
                Ok::<_, ResilienceError>(book.enrich(&author))
            })
            .buffered(self.lookup_concurrency)
            .try_collect()
            .await
    }
}

// ---------------------------------------------------------------------------
// EnrichmentService
// ---------------------------------------------------------------------------

/// Tower service running one [`EnrichmentPipeline`] pass per request.
#[derive(Clone)]
pub struct EnrichmentService {
    pipeline: Arc<EnrichmentPipeline>,
}

impl EnrichmentService {
    #[must_use]
    pub fn new(pipeline: Arc<EnrichmentPipeline>) -> Self {
        Self { pipeline }
    }
}

impl Service<EnrichAll> for EnrichmentService {
    type Response = Catalog;
    type Error = ResilienceError;
    type Future = BoxedFuture<Catalog>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: EnrichAll) -> Self::Future {
        let pipeline = Arc::clone(&self.pipeline);
        Box::pin(async move { pipeline.enrich_all().await.map(Catalog::Enriched) })
    }
}

// ---------------------------------------------------------------------------
// PlainListingService
// ---------------------------------------------------------------------------

/// Degraded listing: the plain records with no author lookups.
///
/// Used as the fallback of the guarded enrichment call. It must stay
/// outside the resilience stack so a failing fallback cannot re-enter it.
#[derive(Clone)]
pub struct PlainListingService {
    store: Arc<dyn BookStore>,
}

impl PlainListingService {
    #[must_use]
    pub fn new(store: Arc<dyn BookStore>) -> Self {
        Self { store }
    }
}

impl Service<EnrichAll> for PlainListingService {
    type Response = Catalog;
    type Error = ResilienceError;
    type Future = BoxedFuture<Catalog>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: EnrichAll) -> Self::Future {
        let store = Arc::clone(&self.store);
        Box::pin(async move { Ok(Catalog::Degraded(store.find_all().await?)) })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
