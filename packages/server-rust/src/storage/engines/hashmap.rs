//! In-memory [`BookStore`] implementation backed by [`DashMap`].
//!
//! Provides concurrent read/write access without external locking.
//! Suitable for development, testing, and deployments where the catalog
//! fits in memory and need not survive restarts.

use std::sync::atomic::{AtomicI32, Ordering};

use async_trait::async_trait;
use catalog_core::{BookId, BookPayload, BookRecord};
use dashmap::DashMap;

use crate::traits::BookStore;

/// In-memory book storage with a monotonically increasing id sequence.
///
/// `find_all` returns records ordered by id, which is insertion order
/// because ids are never reused.
pub struct HashMapBookStore {
    books: DashMap<BookId, BookRecord>,
    next_id: AtomicI32,
}

impl HashMapBookStore {
    /// Creates a new, empty store whose first assigned id is 1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            books: DashMap::new(),
            next_id: AtomicI32::new(1),
        }
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.books.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.books.is_empty()
    }
}

impl Default for HashMapBookStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BookStore for HashMapBookStore {
    async fn find_by_id(&self, id: BookId) -> anyhow::Result<Option<BookRecord>> {
        Ok(self.books.get(&id).map(|r| r.clone()))
    }

    async fn find_all(&self) -> anyhow::Result<Vec<BookRecord>> {
        let mut books: Vec<BookRecord> = self
            .books
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        books.sort_by_key(|b| b.id);
        Ok(books)
    }

    async fn insert(&self, book: BookPayload) -> anyhow::Result<BookRecord> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = book.into_record(id);
        self.books.insert(id, record.clone());
        Ok(record)
    }

    async fn update(&self, book: BookRecord) -> anyhow::Result<bool> {
        match self.books.get_mut(&book.id) {
            Some(mut entry) => {
                *entry = book;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: BookId) -> anyhow::Result<bool> {
        Ok(self.books.remove(&id).is_some())
    }
}
