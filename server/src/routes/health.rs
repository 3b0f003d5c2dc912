//! Health check endpoint

use std::path::PathBuf;

use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct ModelSummary {
    pub path: PathBuf,
    pub image_size: usize,
    pub trained_at: Option<String>,
    pub epochs: Option<usize>,
    pub validation_accuracy: Option<f64>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub started_at: DateTime<Utc>,
    pub version: String,
    pub backend: String,
    pub model: ModelSummary,
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    let metadata = state.predictor.manifest().map(|m| &m.metadata);

    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        started_at: state.started_at_utc,
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: pneumonia_cnn::backend::backend_name().to_string(),
        model: ModelSummary {
            path: state.model_path.clone(),
            image_size: state.predictor.image_size(),
            trained_at: metadata.map(|m| m.trained_at.clone()),
            epochs: metadata.map(|m| m.epochs),
            validation_accuracy: metadata.and_then(|m| m.validation_accuracy),
        },
    })
}
