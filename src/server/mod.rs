// src/server/mod.rs

//! HTTP server for the tracker API.

pub mod routes;

use crate::config::TrackerConfig;
use crate::error::Result;
use crate::scanner::ScanScheduler;
use std::sync::Arc;
use tracing::info;

/// State shared by all request handlers.
pub struct AppState {
    pub config: TrackerConfig,
    pub scheduler: Arc<ScanScheduler>,
}

pub type SharedState = Arc<AppState>;

/// Bind and serve the API until the process is stopped.
pub async fn run_server(config: TrackerConfig, scheduler: Arc<ScanScheduler>) -> Result<()> {
    let bind = config.bind;
    let state: SharedState = Arc::new(AppState { config, scheduler });
    let app = routes::build_router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("Listening on http://{}", bind);
    axum::serve(listener, app).await?;

    Ok(())
}
