//! HTTP server for the enrichment service

pub mod routes;
pub mod state;

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::EnricherConfig;
use crate::error::{Error, Result};
use crate::storage;
use state::AppState;

/// Enrichment HTTP server
pub struct EnricherServer {
    config: EnricherConfig,
    state: AppState,
}

impl EnricherServer {
    /// Create a server talking to the Ollama instance from `config`
    pub fn new(config: EnricherConfig) -> Result<Self> {
        let state = AppState::new(config.clone())?;
        Ok(Self { config, state })
    }

    /// Create a server around prepared state
    pub fn with_state(state: AppState) -> Self {
        Self {
            config: state.config().clone(),
            state,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let router = Router::new()
            // Health check
            .route("/health", get(health_check))
            .nest("/api", routes::api_routes(self.config.server.max_upload_size))
            .with_state(self.state.clone())
            // Middleware layers (order matters - applied bottom to top)
            .layer(TraceLayer::new_for_http())
            .layer(CompressionLayer::new());

        if self.config.server.enable_cors {
            router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        } else {
            router
        }
    }

    /// Start the retention sweeper and serve until the process stops
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let storage_config = &self.config.storage;
        storage::spawn_sweeper(
            vec![
                self.state.upload_dir().to_path_buf(),
                self.state.output_dir().to_path_buf(),
            ],
            Duration::from_secs(storage_config.max_file_age_secs),
            Duration::from_secs(storage_config.sweep_interval_secs),
        );

        let router = self.build_router();

        tracing::info!("Starting ticket enricher on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
