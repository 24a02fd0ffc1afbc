// ─── plugship distribution server ───────────────────────────────────
//
// Two routes: `GET /list` reports the plugin directories under the
// configured root with their mtimes, `POST /update` zips the requested
// plugins and returns the archive. Filesystem work runs on the blocking
// pool; no state is shared between requests beyond the config.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use plugship_core::{
    build_archive, list_plugins, ErrorBody, ListResponse, PlugshipError, ServerConfig,
    UpdateRequest,
};

// ── Shared state ────────────────────────────────────────────────────

#[derive(Clone)]
struct AppState {
    config: Arc<ServerConfig>,
}

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Debug)]
enum ApiError {
    Core(PlugshipError),
    Task(tokio::task::JoinError),
}

impl From<PlugshipError> for ApiError {
    fn from(e: PlugshipError) -> Self {
        ApiError::Core(e)
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Task(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match self {
            ApiError::Core(e) => e.to_string(),
            ApiError::Task(e) => format!("worker task failed: {}", e),
        };
        tracing::error!("request failed: {}", message);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody { error: message }),
        )
            .into_response()
    }
}

// ── Entry point ─────────────────────────────────────────────────────

/// Build the router serving `config.plugins_root`.
pub fn router(config: ServerConfig) -> Router {
    let state = AppState {
        config: Arc::new(config),
    };

    Router::new()
        .route("/list", get(list_handler))
        .route("/update", post(update_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: ServerConfig) -> Result<()> {
    let ip = config
        .host
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("invalid listen host: {}", config.host))?;
    let addr = SocketAddr::new(ip, config.port);

    if !config.plugins_root.is_dir() {
        tracing::warn!(
            "plugins root {} is not a directory; /list will fail until it exists",
            config.plugins_root.display()
        );
    }
    tracing::info!(
        "serving plugins from {} on http://{}",
        config.plugins_root.display(),
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, router(config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

// ── Handlers ────────────────────────────────────────────────────────

async fn list_handler(State(state): State<AppState>) -> Result<Json<ListResponse>, ApiError> {
    let config = state.config.clone();
    let plugins = tokio::task::spawn_blocking(move || list_plugins(&config.plugins_root)).await??;
    Ok(Json(ListResponse { plugins }))
}

async fn update_handler(
    State(state): State<AppState>,
    Json(req): Json<UpdateRequest>,
) -> Result<Response, ApiError> {
    let config = state.config.clone();
    let requested = req.download_list.len();
    let archive = tokio::task::spawn_blocking(move || {
        build_archive(&config.plugins_root, req.download_list.as_slice())
    })
    .await??;

    tracing::info!(
        requested,
        archived = archive.plugins.len(),
        entries = archive.entries,
        bytes = archive.bytes.len(),
        "built plugin archive"
    );
    if !archive.skipped.is_empty() {
        tracing::debug!("unknown plugins skipped: {:?}", archive.skipped);
    }

    let disposition = format!(
        "attachment; filename=\"{}\"",
        state.config.archive_file_name()
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        archive.bytes,
    )
        .into_response())
}
