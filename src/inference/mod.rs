//! Inference module for single-image prediction and test-set evaluation

pub mod evaluate;
pub mod predictor;

// Re-export main types for convenience
pub use evaluate::{evaluate_model, EvaluationOutcome};
pub use predictor::{Prediction, Predictor};
