//! API router configuration.

use std::future::Future;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    api_info, delete_conversation, diagnostics, get_conversation, get_job, health, interrupt,
    list_jobs, reset_jobs, run_command, split_script, start_job, AppState,
};
use crate::error::ShellTetherError;

/// Create the API router with all routes configured.
pub fn create_router() -> Router {
    create_router_with_state(AppState::new())
}

/// Create the API router with custom state.
pub fn create_router_with_state(state: AppState) -> Router {
    let conversation_routes = Router::new()
        .route("/{id}", get(get_conversation).delete(delete_conversation))
        .route("/{id}/run", post(run_command))
        .route("/{id}/interrupt", post(interrupt))
        .route(
            "/{id}/jobs",
            get(list_jobs).post(start_job).delete(reset_jobs),
        )
        .route("/{id}/jobs/{job_id}", get(get_job));

    let api_v1 = Router::new()
        .route("/", get(api_info))
        .route("/split", post(split_script))
        .route("/diagnostics", get(diagnostics))
        .nest("/conversations", conversation_routes);

    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl ServerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

/// Start the API server.
pub async fn serve(config: ServerConfig) -> crate::Result<()> {
    serve_with_state(config, AppState::new(), std::future::pending()).await
}

/// Start the API server with custom state, stopping when `shutdown`
/// resolves.
///
/// Every conversation's shell and background jobs are torn down once the
/// server has stopped.
pub async fn serve_with_state<F>(
    config: ServerConfig,
    state: AppState,
    shutdown: F,
) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.bind_address();
    let registry = std::sync::Arc::clone(&state.registry);
    let router = create_router_with_state(state);

    tracing::info!("Starting shell-tether API server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(ShellTetherError::Io)?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ShellTetherError::Io)?;

    let closed = tokio::task::spawn_blocking(move || registry.teardown_all())
        .await
        .map_err(|e| ShellTetherError::Io(std::io::Error::other(e.to_string())))??;
    tracing::info!(conversations = closed, "server stopped");

    Ok(())
}
