//! Training module
//!
//! A custom loop over Burn's autodiff backend: binary cross-entropy on the
//! single output logit, Adam, and a validation pass after every epoch.

pub mod loss;
pub mod supervised;

use serde::{Deserialize, Serialize};

use crate::utils::error::{PneumoniaError, Result};

pub use supervised::{train, EpochMetrics, TrainingHistory, TrainingOutcome};

/// Training hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    /// Seeds weight initialization and the per-epoch shuffle
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 9,
            batch_size: 32,
            learning_rate: 1e-3,
            seed: 42,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(PneumoniaError::Config("epochs must be positive".to_string()));
        }
        if self.batch_size == 0 {
            return Err(PneumoniaError::Config("batch_size must be positive".to_string()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(PneumoniaError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        Ok(())
    }
}
