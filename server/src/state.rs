//! Application state for the inference server
//!
//! Built once in `main` before the listener binds and shared with every
//! handler through axum's `State`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use pneumonia_cnn::backend::DefaultBackend;
use pneumonia_cnn::Predictor;

/// Shared application state
pub struct AppState {
    /// Model bundle loaded at startup
    pub model_path: PathBuf,
    pub predictor: Predictor<DefaultBackend>,
    /// Server start time
    pub started_at: Instant,
    pub started_at_utc: DateTime<Utc>,
}

impl AppState {
    pub fn new(model_path: PathBuf, predictor: Predictor<DefaultBackend>) -> Self {
        Self {
            model_path,
            predictor,
            started_at: Instant::now(),
            started_at_utc: Utc::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

pub type SharedState = Arc<AppState>;

#[cfg(test)]
pub mod test_support {
    use super::*;
    use pneumonia_cnn::backend::default_device;
    use pneumonia_cnn::PneumoniaClassifierConfig;

    /// State around a small untrained model
    pub fn test_state() -> SharedState {
        let device = default_device();
        let config = PneumoniaClassifierConfig::new().with_image_size(64).with_hidden_size(8);
        let model = config.init::<DefaultBackend>(&device).unwrap();
        let predictor = Predictor::from_model(model, config, device);

        Arc::new(AppState::new(PathBuf::from("test_model.tar.gz"), predictor))
    }
}
