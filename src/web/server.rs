//! HTTP server implementation

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use super::handlers::{cluster_handler, execute_command, stats_handler};
use crate::dispatch::Services;

/// Build the application router
pub fn router(services: Services) -> Router {
    Router::new()
        .route("/command", post(execute_command))
        .route("/stats", get(stats_handler))
        .route("/cluster", get(cluster_handler))
        .layer(CorsLayer::permissive())
        .with_state(services)
}

/// Run the web server
pub async fn run_web_server(addr: &str, services: Services) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Web interface available at http://{}", listener.local_addr()?);

    axum::serve(listener, router(services)).await?;

    Ok(())
}
