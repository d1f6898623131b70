//! HTTP author client backed by `reqwest`.

use async_trait::async_trait;
use catalog_core::AuthorInfo;
use reqwest::StatusCode;
use tracing::debug;

use super::{AuthorClientConfig, AuthorError};
use crate::traits::AuthorClient;

/// Looks authors up with `GET {base_url}/authors/{id}`.
///
/// Connection establishment is bounded by the configured connect timeout.
/// The overall request is bounded by the caller (the attempt timeout of the
/// resilience stack), so no request timeout is set here.
#[derive(Debug, Clone)]
pub struct HttpAuthorClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAuthorClient {
    /// Builds a client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built
    /// (e.g., the TLS backend fails to initialize).
    pub fn new(config: &AuthorClientConfig) -> Result<Self, AuthorError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn author_url(&self, id: i64) -> String {
        format!("{}/authors/{id}", self.base_url)
    }
}

#[async_trait]
impl AuthorClient for HttpAuthorClient {
    async fn find_by_id(&self, id: i64) -> Result<AuthorInfo, AuthorError> {
        let url = self.author_url(id);
        debug!(author_id = id, url = %url, "looking up author");

        let response = self.client.get(&url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(AuthorError::NotFound { id }),
            status if !status.is_success() => Err(AuthorError::Status {
                id,
                status: status.as_u16(),
            }),
            _ => Ok(response.json::<AuthorInfo>().await?),
        }
    }
}
