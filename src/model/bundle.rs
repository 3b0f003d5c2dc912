//! Model bundle persistence
//!
//! A trained model is stored as one `.tar.gz` file:
//!
//! - `config.json`: architecture config plus training metadata
//! - `model.bin`: full-precision weights

use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use burn::{
    module::Module,
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::backend::Backend,
};
use chrono::Local;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tar::{Archive, Builder, Header};
use tracing::info;

use super::cnn::{PneumoniaClassifier, PneumoniaClassifierConfig};
use crate::utils::error::{PneumoniaError, Result, ResultExt};

const CONFIG_ENTRY: &str = "config.json";
const WEIGHTS_ENTRY: &str = "model.bin";

/// Information about how a bundled model was trained
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleMetadata {
    /// Local timestamp, RFC 3339
    pub trained_at: String,
    pub epochs: usize,
    /// Training samples after balancing, synthetic ones included
    pub train_samples: usize,
    pub validation_accuracy: Option<f64>,
    pub backend: String,
    pub crate_version: String,
}

impl BundleMetadata {
    pub fn new(epochs: usize, train_samples: usize, validation_accuracy: Option<f64>) -> Self {
        Self {
            trained_at: Local::now().to_rfc3339(),
            epochs,
            train_samples,
            validation_accuracy,
            backend: crate::backend::backend_name().to_string(),
            crate_version: crate::VERSION.to_string(),
        }
    }
}

/// Contents of `config.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleManifest {
    pub model: PneumoniaClassifierConfig,
    pub metadata: BundleMetadata,
}

fn append_entry<W: std::io::Write>(builder: &mut Builder<W>, name: &str, bytes: &[u8]) -> Result<()> {
    let mut header = Header::new_gnu();
    header.set_path(name)?;
    header.set_size(bytes.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append(&header, bytes)?;
    Ok(())
}

/// Write `model` and its manifest to `path`
pub fn save_bundle<B: Backend>(
    path: &Path,
    model: PneumoniaClassifier<B>,
    manifest: &BundleManifest,
) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let weights = recorder
        .record(model.into_record(), ())
        .map_err(|e| PneumoniaError::Model(format!("failed to serialize weights: {:?}", e)))?;
    let config_json = serde_json::to_vec_pretty(manifest)?;

    let encoder = GzEncoder::new(File::create(path)?, Compression::default());
    let mut builder = Builder::new(encoder);
    append_entry(&mut builder, CONFIG_ENTRY, &config_json)?;
    append_entry(&mut builder, WEIGHTS_ENTRY, &weights)?;
    builder.into_inner()?.finish()?;

    info!("Saved model bundle to {:?} ({} weight bytes)", path, weights.len());
    Ok(())
}

/// Read the raw manifest and weight bytes of a bundle
fn read_entries(path: &Path) -> Result<(BundleManifest, Vec<u8>)> {
    if !path.is_file() {
        return Err(PneumoniaError::PathNotFound(path.to_path_buf()));
    }

    let mut archive = Archive::new(GzDecoder::new(File::open(path)?));
    let mut manifest = None;
    let mut weights = None;

    for entry in archive
        .entries()
        .map_err(|e| PneumoniaError::Model(format!("{:?} is not a model bundle: {}", path, e)))?
    {
        let mut entry =
            entry.map_err(|e| PneumoniaError::Model(format!("corrupt bundle {:?}: {}", path, e)))?;
        let name = entry
            .path()
            .context("invalid entry name in model bundle")?
            .to_string_lossy()
            .to_string();

        match name.as_str() {
            CONFIG_ENTRY => {
                let mut json = String::new();
                entry.read_to_string(&mut json)?;
                manifest = Some(serde_json::from_str::<BundleManifest>(&json)?);
            }
            WEIGHTS_ENTRY => {
                let mut bytes = Vec::new();
                entry.read_to_end(&mut bytes)?;
                weights = Some(bytes);
            }
            _ => {}
        }
    }

    match (manifest, weights) {
        (Some(manifest), Some(weights)) => Ok((manifest, weights)),
        (None, _) => Err(PneumoniaError::Model(format!("{} missing from {:?}", CONFIG_ENTRY, path))),
        (_, None) => Err(PneumoniaError::Model(format!("{} missing from {:?}", WEIGHTS_ENTRY, path))),
    }
}

/// Read only the manifest of a bundle
pub fn read_manifest(path: &Path) -> Result<BundleManifest> {
    read_entries(path).map(|(manifest, _)| manifest)
}

/// Rebuild the model stored at `path` on `device`
pub fn load_bundle<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(PneumoniaClassifier<B>, BundleManifest)> {
    let (manifest, weights) = read_entries(path)?;
    let model = manifest.model.init::<B>(device)?;

    let recorder = BinBytesRecorder::<FullPrecisionSettings>::default();
    let record = recorder
        .load(weights, device)
        .map_err(|e| PneumoniaError::Model(format!("failed to load weights: {:?}", e)))?;

    info!(
        "Loaded model bundle {:?} (trained {}, {} epochs)",
        path, manifest.metadata.trained_at, manifest.metadata.epochs
    );
    Ok((model.load_record(record), manifest))
}
