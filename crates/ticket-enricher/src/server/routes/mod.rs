//! API routes for the enrichment server

pub mod models;
pub mod tasks;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        // Submission - with larger body limit for spreadsheet uploads
        .route(
            "/tasks",
            post(tasks::submit_task)
                .layer(DefaultBodyLimit::max(max_upload_size))
                .get(tasks::list_tasks),
        )
        .route("/tasks/:id", get(tasks::get_task))
        .route("/tasks/:id/cancel", post(tasks::cancel_task))
        .route("/tasks/:id/download", get(tasks::download_task))
        // Models
        .route("/models", get(models::list_models))
        // Info
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "ticket-enricher",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Batch enrichment of support-ticket tables with LLM summaries and classifications",
        "endpoints": {
            "POST /api/tasks": "Upload a CSV/XLSX/XLS/ODS table (fields: file, model, context)",
            "GET /api/tasks": "List all tasks",
            "GET /api/tasks/:id": "Get task progress",
            "POST /api/tasks/:id/cancel": "Cancel a running task",
            "GET /api/tasks/:id/download": "Download the enriched table",
            "GET /api/models": "List models served by Ollama"
        }
    }))
}
