//! HTTP API for the OCR service.
//!
//! This module provides the REST endpoints for:
//! - Liveness and health monitoring
//! - PDF upload and OCR processing
//! - Download of staged searchable PDFs

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Request, State},
    http::{HeaderValue, header},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::service::OcrService;

pub mod download;
pub mod ocr;

use download::download_handler;
use ocr::ocr_handler;

/// Application state
pub struct AppState {
    pub service: Arc<OcrService>,
    pub start_time: Instant,
}

/// Build the API router
pub fn router(service: Arc<OcrService>) -> Router {
    // Use the configured max upload size for the OCR route
    let max_body_size = service.config.limits.max_upload_bytes;

    let state = Arc::new(AppState {
        service,
        start_time: Instant::now(),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_handler))
        .route(
            "/ocr",
            post(ocr_handler).layer(DefaultBodyLimit::max(max_body_size)),
        )
        .route("/download/{token}", get(download_handler))
        .layer(middleware::from_fn(force_connection_close))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Advertise connection closure so keep-alive clients don't time out
/// waiting on long synchronous OCR calls.
async fn force_connection_close(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    if !headers.contains_key(header::CONNECTION) {
        headers.insert(header::CONNECTION, HeaderValue::from_static("close"));
    }

    response
}

// === Liveness & Health ===

async fn root_handler() -> &'static str {
    "ok"
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    uptime_seconds: u64,
}
