//! Local web server front end.
//!
//! A small axum app mirroring the terminal flows: preview a URL, then
//! download it as MP3 or MP4 and stream the produced file back.

pub mod routes;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::core::config::AppConfig;
use crate::core::extractor::Extractor;
use crate::core::ffmpeg;
use crate::core::models::{AppError, AppResult};

/// Shared state for the request handlers.
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<AppConfig>,
    pub extractor: Extractor,
}

impl ServerState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            extractor: Extractor::new(),
        }
    }

    pub fn with_extractor(config: AppConfig, extractor: Extractor) -> Self {
        Self {
            config: Arc::new(config),
            extractor,
        }
    }
}

/// Build the application router.
pub fn build_router(state: ServerState) -> Router {
    let cors_layer = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(routes::index))
        .route("/static/app.js", get(routes::app_js))
        .route("/health", get(routes::health))
        .route("/api/preview", get(routes::preview))
        .route("/api/download", post(routes::download))
        .layer(cors_layer)
        .with_state(state)
}

/// Serve until Ctrl+C.
pub async fn serve(config: AppConfig) -> AppResult<()> {
    serve_with_shutdown(config, async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", err);
        }
    })
    .await
}

/// Serve until the given future resolves (the launcher passes its shutdown
/// channel through here).
pub async fn serve_with_shutdown<F>(config: AppConfig, shutdown: F) -> AppResult<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    // Surface missing collaborators at startup; the checks log their own
    // warnings and individual requests still fail with a proper error.
    let _ = ffmpeg::check_yt_dlp().await;
    let _ = ffmpeg::check_ffmpeg().await;

    let bind_address = config.server.bind_address();
    let base_url = config.server.base_url();
    let state = ServerState::new(config);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::AddrInUse => AppError::Server(format!(
                "{} is already in use, another instance seems to be running",
                bind_address
            )),
            _ => AppError::Server(format!("Failed to bind {}: {}", bind_address, e)),
        })?;

    info!("🌐 Server listening on {}", base_url);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| AppError::Server(format!("Server error: {}", e)))?;

    info!("🌐 Server stopped");
    Ok(())
}
