use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

mod api;
mod cache;
mod config;
mod error;
mod ocr;
mod pdftools;
mod preflight;
mod service;

use crate::service::OcrService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!(
        "Starting textlift service v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Load configuration; startup fails on a missing auth token rather
    // than falling back to an insecure default.
    let config = config::load()?;
    config.validate()?;

    info!(
        host = %config.server.host,
        port = config.server.port,
        "Configuration loaded"
    );

    // Initialize the service
    let service = Arc::new(OcrService::new(config)?);

    // Periodically evict expired download-cache entries
    let sweep_service = service.clone();
    let sweep_interval = sweep_service.config.cache.sweep_interval();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_interval);
        loop {
            interval.tick().await;
            let removed = sweep_service.cache.sweep();
            if removed > 0 {
                info!(
                    removed,
                    remaining = sweep_service.cache.len(),
                    "Evicted expired download-cache entries"
                );
            }
        }
    });

    // Build the router
    let app = api::router(service.clone());

    // Start the server
    let addr = format!(
        "{}:{}",
        service.config.server.host, service.config.server.port
    );
    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("textlift_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
