//! Clients for the remote author service.
//!
//! - [`http`]: `reqwest`-backed client for the real service
//! - [`memory`]: in-process map, for tests and demo runs

pub mod http;
pub mod memory;

use std::time::Duration;

pub use http::HttpAuthorClient;
pub use memory::MemoryAuthorClient;

/// Errors raised by an author lookup.
#[derive(Debug, thiserror::Error)]
pub enum AuthorError {
    #[error("author {id} not found")]
    NotFound { id: i64 },
    #[error("author service answered {status} for author {id}")]
    Status { id: i64, status: u16 },
    #[error("author service unavailable: {0}")]
    Unavailable(String),
    #[error("author service transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Connection settings for [`HttpAuthorClient`].
#[derive(Debug, Clone)]
pub struct AuthorClientConfig {
    /// Base URL of the author service; lookups go to `{base_url}/authors/{id}`.
    pub base_url: String,
    /// Maximum time to establish a TCP connection.
    pub connect_timeout: Duration,
}

impl Default for AuthorClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            connect_timeout: Duration::from_millis(1000),
        }
    }
}
