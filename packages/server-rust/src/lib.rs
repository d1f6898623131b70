//! Book catalog server: CRUD over book records plus an author-enriched
//! listing guarded by retry, timeout, bulkhead, circuit-breaker and fallback layers.

pub mod author;
pub mod network;
pub mod service;
pub mod storage;
pub mod traits;

pub use traits::{AuthorClient, BookStore};
