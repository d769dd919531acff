//! Runboard Server Module
//!
//! REST API over the tracking store. Experiments, runs and metric
//! histories are plain CRUD; `POST /api/jobs/start` hands a dataset and
//! model selection to the background training orchestrator.

mod api;
mod error;
mod handlers;
mod state;

pub use api::create_router;
pub use error::ServerError;
pub use state::AppState;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use crate::orchestrator::OrchestratorConfig;

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory holding uploaded datasets
    pub data_dir: String,
    /// JSON snapshot of the tracking store; in-memory only when unset
    pub store_path: Option<String>,
    pub cors_origin: Option<String>,
    pub max_upload_size: usize,
}

fn env_parsed<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(fallback)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: env_parsed("API_HOST", "0.0.0.0".to_string()),
            port: env_parsed("API_PORT", 8000),
            data_dir: env_parsed("DATA_DIR", "./datasets".to_string()),
            store_path: std::env::var("STORE_PATH").ok().filter(|s| !s.is_empty()),
            cors_origin: std::env::var("CORS_ORIGIN").ok().filter(|s| !s.is_empty()),
            max_upload_size: env_parsed("MAX_UPLOAD_SIZE", 100 * 1024 * 1024),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port).parse()?;
        Ok(addr)
    }
}

/// Bind, serve until ctrl-c, then drain in-flight requests
pub async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let started = chrono::Utc::now();
    let addr = config.bind_addr()?;

    std::fs::create_dir_all(&config.data_dir)?;
    let orchestrator = OrchestratorConfig::from_env();
    info!(
        data_dir = %config.data_dir,
        store_path = ?config.store_path,
        iterative_delay_ms = orchestrator.iterative_delay.as_millis() as u64,
        step_delay_ms = orchestrator.step_delay.as_millis() as u64,
        "Initializing tracking server"
    );

    let state = Arc::new(AppState::new(config.clone(), orchestrator)?);
    let store = state.store.clone();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(
        address = %addr,
        api = %format!("http://{}/api", addr),
        max_upload_size_mb = config.max_upload_size / 1024 / 1024,
        "Runboard listening"
    );

    let shutdown_signal = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        let uptime = chrono::Utc::now().signed_duration_since(started);
        info!(uptime_secs = uptime.num_seconds(), "Shutting down");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    if let Err(e) = tokio::task::spawn_blocking(move || store.flush()).await? {
        tracing::error!(error = %e, "Final tracking snapshot failed");
    }
    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8123,
            ..ServerConfig::default()
        };
        assert_eq!(config.bind_addr().unwrap().port(), 8123);

        let bad = ServerConfig {
            host: "not a host".to_string(),
            ..config
        };
        assert!(bad.bind_addr().is_err());
    }
}
