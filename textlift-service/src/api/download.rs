//! Download endpoint for staged searchable PDFs.

use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::error::ServiceError;

use super::AppState;

/// Serve a staged searchable PDF as a binary attachment.
///
/// A token that was never issued, was evicted, or whose backing file is
/// gone all look the same to the client: 404.
pub async fn download_handler(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Response, ServiceError> {
    let path = state
        .service
        .cache
        .resolve(&token)
        .ok_or_else(|| ServiceError::TokenNotFound {
            token: token.clone(),
        })?;

    let data = tokio::fs::read(&path)
        .await
        .map_err(|_| ServiceError::TokenNotFound {
            token: token.clone(),
        })?;

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/pdf"),
            ),
            (
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment; filename=\"searchable.pdf\""),
            ),
        ],
        data,
    )
        .into_response())
}
