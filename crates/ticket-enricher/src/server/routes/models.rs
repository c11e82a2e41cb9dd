//! Model listing endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use crate::providers::ModelInfo;
use crate::server::state::AppState;

/// Models the inference service can run
#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    /// False when the service could not be reached
    pub available: bool,
    pub base_url: String,
    pub default_model: String,
    pub models: Vec<ModelInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /api/models - List models served by Ollama
pub async fn list_models(State(state): State<AppState>) -> Json<ModelsResponse> {
    let config = &state.config().llm;

    let (available, models, error) = match state.llm().list_models().await {
        Ok(models) => (true, models, None),
        Err(e) => {
            tracing::warn!("Cannot list models from {}: {}", config.base_url, e);
            (false, Vec::new(), Some(e.to_string()))
        }
    };

    Json(ModelsResponse {
        available,
        base_url: config.base_url.clone(),
        default_model: config.default_model.clone(),
        models,
        error,
    })
}
