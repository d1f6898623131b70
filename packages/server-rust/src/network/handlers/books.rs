//! Book CRUD and enriched-listing handlers.
//!
//! Write endpoints answer `204 No Content`. The enriched listing answers
//! `200` for both enriched and degraded results; a degraded body carries
//! the [`DEGRADED_HEADER`] marker.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use catalog_core::{BookId, BookPayload, BookRecord};
use serde_json::json;
use tracing::{error, warn};

use super::AppState;
use crate::service::ResilienceError;

/// Response header set to `true` when the listing came from the fallback.
pub const DEGRADED_HEADER: &str = "x-catalog-degraded";

/// Errors surfaced by the book endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Book[id={0}] not found.")]
    NotFound(BookId),
    #[error(transparent)]
    Guarded(#[from] ResilienceError),
    #[error("record store failure: {0}")]
    Store(#[from] anyhow::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Guarded(err) => match err {
                ResilienceError::BulkheadFull { .. } | ResilienceError::CircuitOpen => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                ResilienceError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                ResilienceError::Remote(_) => StatusCode::BAD_GATEWAY,
                ResilienceError::Store(_) | ResilienceError::FallbackFailed(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Guarded(err) => err.kind(),
            Self::Store(_) => "store_failure",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let Self::NotFound(_) = self {
            return (status, self.to_string()).into_response();
        }

        if status.is_server_error() {
            error!(kind = self.kind(), error = %self, "request failed");
        } else {
            warn!(kind = self.kind(), error = %self, "request rejected");
        }
        let body = json!({
            "error": self.kind(),
            "message": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// `GET /books/{id}`
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<BookId>,
) -> Result<Json<BookRecord>, ApiError> {
    state
        .catalog
        .find_by_id(id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound(id))
}

/// `GET /books`
pub async fn list_books(State(state): State<AppState>) -> Result<Json<Vec<BookRecord>>, ApiError> {
    Ok(Json(state.catalog.find_all().await?))
}

/// `GET /books/all`
pub async fn list_enriched_books(State(state): State<AppState>) -> Result<Response, ApiError> {
    let listing = state.catalog.enrich_all().await?;
    if listing.is_degraded() {
        Ok(([(DEGRADED_HEADER, "true")], Json(listing)).into_response())
    } else {
        Ok(Json(listing).into_response())
    }
}

/// `POST /books`
pub async fn create_book(
    State(state): State<AppState>,
    Json(payload): Json<BookPayload>,
) -> Result<StatusCode, ApiError> {
    state.catalog.insert(payload).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /books/{id}`
pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<BookId>,
    Json(payload): Json<BookPayload>,
) -> Result<StatusCode, ApiError> {
    if state.catalog.update(id, payload).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(id))
    }
}

/// `DELETE /books/{id}`
pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<BookId>,
) -> Result<StatusCode, ApiError> {
    if state.catalog.delete(id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
