//! In-memory author client backed by [`DashMap`].

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use catalog_core::AuthorInfo;
use dashmap::DashMap;

use super::AuthorError;
use crate::traits::AuthorClient;

/// Author lookups served from a process-local map.
///
/// Counts every lookup and can be switched into an outage mode in which
/// every call fails with [`AuthorError::Unavailable`].
#[derive(Debug, Default)]
pub struct MemoryAuthorClient {
    authors: DashMap<i64, AuthorInfo>,
    lookups: AtomicU64,
    unavailable: AtomicBool,
}

impl MemoryAuthorClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) the author returned for `id`.
    pub fn insert(&self, id: i64, author: AuthorInfo) {
        self.authors.insert(id, author);
    }

    /// Toggles the simulated outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// Number of lookups received so far, including failed ones.
    #[must_use]
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl AuthorClient for MemoryAuthorClient {
    async fn find_by_id(&self, id: i64) -> Result<AuthorInfo, AuthorError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(AuthorError::Unavailable("simulated outage".to_string()));
        }
        self.authors
            .get(&id)
            .map(|a| a.clone())
            .ok_or(AuthorError::NotFound { id })
    }
}
