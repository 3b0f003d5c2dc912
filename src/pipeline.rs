//! End-to-end pipeline
//!
//! extract → detect → consolidate → dedup → index → split → load → balance →
//! train → evaluate. Each stage finishes before the next one starts and any
//! failure aborts the run.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backend::{default_device, DefaultBackend, TrainingBackend};
use crate::dataset::{
    balance, consolidate_splits, count_duplicates, extract_archive, find_split_dirs,
    load_image_tensors, remove_duplicates, split_dataset, ClassLabel, CollisionPolicy,
    DatasetSplits, DatasetTable, DuplicateReport, SmoteConfig, SplitConfig, XrayDataset,
};
use crate::inference::evaluate::evaluate_model;
use crate::model::bundle::{load_bundle, save_bundle, BundleManifest, BundleMetadata};
use crate::model::PneumoniaClassifierConfig;
use crate::training::{train, TrainingConfig, TrainingHistory};
use crate::utils::metrics::Metrics;

pub const SPLITS_FILE: &str = "splits.json";
pub const HISTORY_FILE: &str = "history.json";
pub const EVALUATION_FILE: &str = "evaluation.json";
pub const MODEL_FILE: &str = "pneumonia_model.tar.gz";

/// Everything a full run needs, stored as JSON
///
/// Fields missing from a config file take their default value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Source zip; `None` when `extract_dir` is already populated
    pub archive_path: Option<PathBuf>,
    /// Where the archive is extracted
    pub extract_dir: PathBuf,
    /// Consolidated `NORMAL/` + `PNEUMONIA/` tree
    pub data_dir: PathBuf,
    /// Reports and the model bundle
    pub output_dir: PathBuf,
    pub collision_policy: CollisionPolicy,
    pub split: SplitConfig,
    pub smote: SmoteConfig,
    pub model: PneumoniaClassifierConfig,
    pub training: TrainingConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            archive_path: Some(PathBuf::from("data/archive.zip")),
            extract_dir: PathBuf::from("data/extracted"),
            data_dir: PathBuf::from("data/model_Data"),
            output_dir: PathBuf::from("output"),
            collision_policy: CollisionPolicy::default(),
            split: SplitConfig::default(),
            smote: SmoteConfig::default(),
            model: PneumoniaClassifierConfig::new(),
            training: TrainingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Invalid config file {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write config file {:?}", path))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.split.validate()?;
        self.model.validate()?;
        self.training.validate()?;
        Ok(())
    }

    pub fn splits_path(&self) -> PathBuf {
        self.output_dir.join(SPLITS_FILE)
    }

    pub fn history_path(&self) -> PathBuf {
        self.output_dir.join(HISTORY_FILE)
    }

    pub fn evaluation_path(&self) -> PathBuf {
        self.output_dir.join(EVALUATION_FILE)
    }

    pub fn model_path(&self) -> PathBuf {
        self.output_dir.join(MODEL_FILE)
    }
}

/// Outcome of the data preparation stages
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreparationReport {
    /// Duplicates found per source class directory before consolidation
    pub detected: Vec<DuplicateReport>,
    pub copied: usize,
    pub collisions: usize,
    /// Removal pass over each consolidated class directory
    pub removed: Vec<DuplicateReport>,
}

/// Extract, detect, consolidate and deduplicate into `config.data_dir`
pub fn prepare_dataset(config: &PipelineConfig) -> Result<PreparationReport> {
    if let Some(archive) = &config.archive_path {
        extract_archive(archive, &config.extract_dir)
            .with_context(|| format!("Failed to extract {:?}", archive))?;
    } else {
        info!("No archive configured, using {:?} as is", config.extract_dir);
    }

    let split_dirs = find_split_dirs(&config.extract_dir)?;
    info!("Found splits: {:?}", split_dirs);

    let mut report = PreparationReport::default();
    for split_dir in &split_dirs {
        for label in ClassLabel::ALL {
            report.detected.push(count_duplicates(&split_dir.join(label.name()))?);
        }
    }

    for (_, consolidated) in consolidate_splits(&split_dirs, &config.data_dir, config.collision_policy)? {
        report.copied += consolidated.copied;
        report.collisions += consolidated.collisions.len();
    }

    for label in ClassLabel::ALL {
        report.removed.push(remove_duplicates(&config.data_dir.join(label.name()))?);
    }
    Ok(report)
}

/// What a training run produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub model_path: PathBuf,
    pub history: TrainingHistory,
    pub synthetic_samples: usize,
}

/// Index, split, load, balance, train and save the bundle
pub fn train_from_directory(config: &PipelineConfig) -> Result<TrainingReport> {
    config.validate()?;
    fs::create_dir_all(&config.output_dir)?;

    let table = DatasetTable::from_directory(&config.data_dir)?;
    let splits = split_dataset(&table, &config.split)?;
    splits.log_distribution();
    splits.save(&config.splits_path())?;

    let size = config.model.image_size;
    let loaded = load_image_tensors(&splits.train, size, size);
    if loaded.is_empty() {
        bail!("No training image could be loaded from {:?}", config.data_dir);
    }
    if !loaded.skipped.is_empty() {
        warn!("{} training images skipped", loaded.skipped.len());
    }

    let balanced = balance(loaded.tensors, loaded.labels, &config.smote)
        .context("Failed to balance the training set")?;
    let synthetic_samples = balanced.synthetic;
    let train_samples = balanced.len();

    let train_set = XrayDataset::from_balanced(balanced);
    let validation_set = XrayDataset::from_records(splits.validation.clone(), size);

    let device = default_device();
    let outcome = train::<TrainingBackend>(
        &train_set,
        &validation_set,
        &config.model,
        &config.training,
        &device,
    )?;
    drop(train_set);

    outcome.history.save(&config.history_path())?;

    let model_path = config.model_path();
    let manifest = BundleManifest {
        model: config.model.clone(),
        metadata: BundleMetadata::new(
            config.training.epochs,
            train_samples,
            outcome.history.last().map(|e| e.val_accuracy),
        ),
    };
    save_bundle(&model_path, outcome.model, &manifest)?;

    Ok(TrainingReport {
        model_path,
        history: outcome.history,
        synthetic_samples,
    })
}

/// Evaluate a bundle on the test split recorded in `splits_path`
pub fn evaluate_bundle(model_path: &Path, splits_path: &Path, batch_size: usize) -> Result<Metrics> {
    let device = default_device();
    let (model, manifest) = load_bundle::<DefaultBackend>(model_path, &device)?;
    let splits = DatasetSplits::load(splits_path)
        .with_context(|| format!("Failed to load splits from {:?}", splits_path))?;

    let size = manifest.model.image_size;
    let expected = splits.test.len();
    let test_set = XrayDataset::from_records(splits.test, size);
    let outcome = evaluate_model(&model, &test_set, batch_size, size, &device)?;
    if outcome.len() < expected {
        warn!("{} test images could not be loaded", expected - outcome.len());
    }
    Ok(outcome.metrics())
}

/// Save evaluation metrics as JSON
pub fn save_metrics(metrics: &Metrics, path: &Path) -> Result<()> {
    fs::write(path, serde_json::to_string_pretty(metrics)?)
        .with_context(|| format!("Failed to write {:?}", path))?;
    info!("Saved evaluation to {:?}", path);
    Ok(())
}

/// Summary of a full run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub preparation: PreparationReport,
    pub training: TrainingReport,
    pub evaluation: Metrics,
}

/// Run every stage in order
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineSummary> {
    config.validate()?;

    info!("Stage 1/3: preparing dataset");
    let preparation = prepare_dataset(config)?;

    info!("Stage 2/3: training");
    let training = train_from_directory(config)?;

    info!("Stage 3/3: evaluating on the test split");
    let evaluation = evaluate_bundle(
        &training.model_path,
        &config.splits_path(),
        config.training.batch_size,
    )?;
    save_metrics(&evaluation, &config.evaluation_path())?;

    Ok(PipelineSummary {
        preparation,
        training,
        evaluation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.training.epochs, 9);
        assert_eq!(config.model.image_size, 224);
        assert_eq!(config.smote.k_neighbors, 5);
    }

    #[test]
    fn test_config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let mut config = PipelineConfig::default();
        config.collision_policy = CollisionPolicy::Skip;
        config.split.seed = None;
        config.save(&path).unwrap();

        let loaded = PipelineConfig::load(&path).unwrap();
        assert_eq!(loaded.collision_policy, CollisionPolicy::Skip);
        assert_eq!(loaded.split.seed, None);
        assert_eq!(loaded.model_path(), PathBuf::from("output").join(MODEL_FILE));
    }

    #[test]
    fn test_invalid_config_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        let mut config = PipelineConfig::default();
        config.split.test_fraction = 1.5;
        config.save(&path).unwrap();
        assert!(PipelineConfig::load(&path).is_err());
    }
}
