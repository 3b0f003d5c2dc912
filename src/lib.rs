//! # Pneumonia CNN
//!
//! A Rust library for classifying chest X-rays as NORMAL or PNEUMONIA using the Burn framework.
//!
//! ## Features
//!
//! - **Perceptual-hash deduplication** of near-identical X-ray images
//! - **Dataset assembly** from the train/test folders of the source archive
//! - **SMOTE balancing** of the minority class before training
//! - **Burn CNN** with a single sigmoid output, bundled into one model file
//!
//! ## Modules
//!
//! - `dataset`: Archive extraction, dedup, consolidation, indexing, splitting, loading and balancing
//! - `model`: CNN architecture and the model bundle format
//! - `training`: Training loop with binary cross-entropy and Adam
//! - `inference`: Single-image prediction and test-set evaluation
//! - `pipeline`: End-to-end orchestration driven by [`pipeline::PipelineConfig`]
//! - `utils`: Logging, metrics, and error types
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pneumonia_cnn::dataset::{DatasetTable, SplitConfig, split_dataset};
//!
//! let table = DatasetTable::from_directory("data/model_Data")?;
//! let splits = split_dataset(&table, &SplitConfig::default())?;
//! ```

pub mod backend;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{
    balance, split_dataset, ClassLabel, DatasetSplits, DatasetTable, ImageRecord, ImageTensor,
    SmoteConfig, SplitConfig,
};
pub use inference::predictor::{Prediction, Predictor};
pub use model::bundle::{load_bundle, save_bundle, BundleMetadata};
pub use model::cnn::{PneumoniaClassifier, PneumoniaClassifierConfig};
pub use pipeline::PipelineConfig;
pub use training::TrainingConfig;
pub use utils::error::{PneumoniaError, Result};

/// Model input height and width
pub const IMAGE_SIZE: usize = 224;

/// Number of color channels fed to the model
pub const IMAGE_CHANNELS: usize = 3;

/// Sigmoid threshold separating NORMAL from PNEUMONIA
pub const DECISION_THRESHOLD: f32 = 0.5;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
