//! Ticket enricher server binary
//!
//! Run with: cargo run -p ticket-enricher --bin ticket-enricher-server
//! Set TICKET_ENRICHER_CONFIG to a TOML file to override the defaults.

use std::path::PathBuf;
use ticket_enricher::{config::EnricherConfig, server::EnricherServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_ENV: &str = "TICKET_ENRICHER_CONFIG";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ticket_enricher=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    println!(
        r#"
╔═══════════════════════════════════════════════════════════╗
║                     Ticket Enricher                       ║
║       LLM summaries and classifications for tickets       ║
╚═══════════════════════════════════════════════════════════╝
"#
    );

    // Load configuration
    let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let config = EnricherConfig::load(config_path.as_deref())?;

    match &config_path {
        Some(path) => tracing::info!("Configuration loaded from {}", path.display()),
        None => tracing::info!("Configuration loaded (defaults, {} not set)", CONFIG_ENV),
    }
    tracing::info!("  - Default model: {}", config.llm.default_model);
    tracing::info!("  - Workers per batch: {}", config.processing.worker_count());
    tracing::info!(
        "  - Attempts per call: {} ({}s apart)",
        config.llm.max_retries,
        config.llm.retry_delay_secs
    );

    let server = EnricherServer::new(config.clone())?;

    // Check Ollama
    tracing::info!("Checking Ollama at {}...", config.llm.base_url);
    match server.state().llm().health_check().await {
        Ok(true) => {
            tracing::info!("Ollama is running");
            if let Ok(false) = server.state().llm().model_exists(&config.llm.default_model).await {
                tracing::warn!(
                    "Default model {} is not pulled: ollama pull {}",
                    config.llm.default_model,
                    config.llm.default_model
                );
            }
        }
        _ => {
            tracing::warn!("Ollama not available at {}", config.llm.base_url);
            tracing::warn!("Please start Ollama:");
            tracing::warn!("  1. Start: ollama serve");
            tracing::warn!("  2. Pull model: ollama pull {}", config.llm.default_model);
        }
    }

    println!("\nServer starting...");
    println!("  API: http://{}", server.address());
    println!("  Health: http://{}/health", server.address());
    println!("  API Info: http://{}/api/info", server.address());
    println!("\nEndpoints:");
    println!("  POST /api/tasks              - Upload a ticket table");
    println!("  GET  /api/tasks/:id          - Check progress");
    println!("  POST /api/tasks/:id/cancel   - Cancel a task");
    println!("  GET  /api/tasks/:id/download - Download the enriched table");
    println!("\nPress Ctrl+C to stop\n");

    server.start().await?;

    Ok(())
}
