use axum::extract::DefaultBodyLimit;
use axum::Router;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;

pub mod api;
pub mod envelope;
mod handlers;
mod health;

use crate::webdav;
use crate::{ServiceConfig, ServiceState};

const API_PREFIX: &str = "/api";
const DAV_PREFIX: &str = "/dav";
const STATUS_PREFIX: &str = "/_status";

/// Assemble the full surface: JSON API, WebDAV, and status probes.
pub fn build_router(config: &ServiceConfig, state: ServiceState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .on_response(
            DefaultOnResponse::new()
                .include_headers(false)
                .level(tracing::Level::INFO)
                .latency_unit(LatencyUnit::Micros),
        )
        .on_failure(DefaultOnFailure::new().latency_unit(LatencyUnit::Micros));

    // WebDAV clients send arbitrary headers (If, Depth, Destination) and
    // presigned-PUT pages need preflight; stay permissive and let auth do
    // the gatekeeping.
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest(STATUS_PREFIX, health::router(state.clone()))
        .nest(API_PREFIX, api::router(state.clone()))
        .nest(DAV_PREFIX, webdav::router(state.clone()))
        .fallback(handlers::not_found_handler)
        .layer(DefaultBodyLimit::max(config.body_limit))
        .layer(cors_layer)
        .with_state(state)
        .layer(trace_layer)
}

/// Run the HTTP surface on one listener.
pub async fn run(
    config: ServiceConfig,
    state: ServiceState,
    mut shutdown_rx: watch::Receiver<()>,
) -> Result<(), HttpServerError> {
    let router = build_router(&config, state);

    tracing::info!(addr = %config.listen_addr, "HTTP server listening");
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        })
        .await?;

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("an error occurred running the HTTP server: {0}")]
    ServingFailed(#[from] std::io::Error),
}
