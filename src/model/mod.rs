//! Model module: CNN architecture and the single-file model bundle

pub mod bundle;
pub mod cnn;

pub use bundle::{load_bundle, save_bundle, BundleMetadata, BundleManifest};
pub use cnn::{PneumoniaClassifier, PneumoniaClassifierConfig};
