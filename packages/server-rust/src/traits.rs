use async_trait::async_trait;
use catalog_core::{AuthorInfo, BookId, BookPayload, BookRecord};

use crate::author::AuthorError;

/// Pluggable persistence backend for book records.
/// Implementations: in-memory (`DashMap`), `PostgreSQL` (feature `postgres`).
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Load a single record by id. `None` when absent.
    async fn find_by_id(&self, id: BookId) -> anyhow::Result<Option<BookRecord>>;

    /// Load every record, in the store's natural order.
    async fn find_all(&self) -> anyhow::Result<Vec<BookRecord>>;

    /// Insert a record under a freshly assigned id and return it.
    async fn insert(&self, book: BookPayload) -> anyhow::Result<BookRecord>;

    /// Replace the record with the same id. Returns `false` if none existed.
    async fn update(&self, book: BookRecord) -> anyhow::Result<bool>;

    /// Delete a record by id. Returns `false` if none existed.
    async fn delete(&self, id: BookId) -> anyhow::Result<bool>;

    /// One-time initialization (e.g., create tables).
    async fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Release resources and close connections.
    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Remote lookup of author name parts by numeric identifier.
/// Implementations: HTTP (`reqwest`), memory (tests, demo).
///
/// No caching: every call reaches the backing service.
#[async_trait]
pub trait AuthorClient: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<AuthorInfo, AuthorError>;
}
