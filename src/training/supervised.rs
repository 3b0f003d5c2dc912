//! Supervised training loop
//!
//! A simple custom loop rather than Burn's `LearnerBuilder`: shuffled
//! mini-batches from the balanced set, Adam updates, and validation on the
//! untouched validation split after every epoch.

use std::fs;
use std::path::Path;

use burn::{
    data::dataloader::batcher::Batcher,
    data::dataset::Dataset,
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::{activation::sigmoid, backend::AutodiffBackend, ElementConversion},
};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::loss::binary_cross_entropy_with_logits;
use super::TrainingConfig;
use crate::dataset::{ClassLabel, XrayBatch, XrayBatcher, XrayDataset};
use crate::inference::evaluate::evaluate_model;
use crate::model::{PneumoniaClassifier, PneumoniaClassifierConfig};
use crate::utils::error::{PneumoniaError, Result};
use crate::utils::logging::TrainingLogger;
use crate::DECISION_THRESHOLD;

/// Metrics of one epoch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number
    pub epoch: usize,
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

/// Per-epoch training curve
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
}

impl TrainingHistory {
    pub fn best_val_accuracy(&self) -> Option<f64> {
        self.epochs
            .iter()
            .map(|e| e.val_accuracy)
            .fold(None, |best, acc| Some(best.map_or(acc, |b: f64| b.max(acc))))
    }

    pub fn last(&self) -> Option<&EpochMetrics> {
        self.epochs.last()
    }

    /// Save history to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved training history to {:?}", path);
        Ok(())
    }

    /// Load history from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PneumoniaError::PathNotFound(path.to_path_buf()));
        }
        Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
    }
}

/// Trained model (moved off the autodiff backend) and its history
pub struct TrainingOutcome<B: AutodiffBackend> {
    pub model: PneumoniaClassifier<B::InnerBackend>,
    pub history: TrainingHistory,
}

/// Train a fresh model on `train_set`, validating on `validation_set` each epoch
pub fn train<B: AutodiffBackend>(
    train_set: &XrayDataset,
    validation_set: &XrayDataset,
    model_config: &PneumoniaClassifierConfig,
    config: &TrainingConfig,
    device: &B::Device,
) -> Result<TrainingOutcome<B>> {
    config.validate()?;
    if train_set.is_empty() {
        return Err(PneumoniaError::Training("training set is empty".to_string()));
    }
    if validation_set.is_empty() {
        warn!("Validation set is empty, validation metrics will be zero");
    }

    B::seed(device, config.seed);
    let mut model = model_config.init::<B>(device)?;
    let mut optimizer = AdamConfig::new().init();
    let batcher = XrayBatcher::new(model_config.image_size);
    let mut epoch_rng = ChaCha8Rng::seed_from_u64(config.seed);

    info!(
        "Training on {} samples ({}), validating on {} ({})",
        train_set.len(),
        train_set.class_counts(),
        validation_set.len(),
        validation_set.class_counts()
    );

    let mut history = TrainingHistory::default();
    let mut logger = TrainingLogger::new(config.epochs);

    for epoch in 0..config.epochs {
        logger.start_epoch(epoch);

        let mut indices: Vec<usize> = (0..train_set.len()).collect();
        indices.shuffle(&mut epoch_rng);

        let mut loss_sum = 0.0f64;
        let mut correct = 0usize;
        let mut seen = 0usize;

        for (batch_idx, chunk) in indices.chunks(config.batch_size).enumerate() {
            let items: Vec<_> = chunk.iter().filter_map(|&i| train_set.get(i)).collect();
            if items.is_empty() {
                continue;
            }

            let batch: XrayBatch<B> = batcher.batch(items, device);
            let count = batch.labels.len();

            let logits = model.forward(batch.images);
            let loss = binary_cross_entropy_with_logits(logits.clone(), batch.targets);
            let loss_value: f64 = loss.clone().into_scalar().elem();

            let probabilities = sigmoid(logits.detach())
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| PneumoniaError::Training(format!("{:?}", e)))?;
            correct += probabilities
                .iter()
                .zip(&batch.labels)
                .filter(|(p, label)| ClassLabel::from_probability(**p, DECISION_THRESHOLD) == **label)
                .count();
            loss_sum += loss_value * count as f64;
            seen += count;

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &model);
            model = optimizer.step(config.learning_rate, model, grads);

            debug!("Batch {}: loss = {:.4}", batch_idx + 1, loss_value);
        }

        if seen == 0 {
            return Err(PneumoniaError::Training(
                "no training sample could be loaded".to_string(),
            ));
        }
        let train_loss = loss_sum / seen as f64;
        let train_accuracy = correct as f64 / seen as f64;

        let validation = evaluate_model(
            &model.valid(),
            validation_set,
            config.batch_size,
            model_config.image_size,
            device,
        )?;
        let val_accuracy = validation.accuracy();

        logger.end_epoch(train_loss, train_accuracy, validation.loss, val_accuracy);
        history.epochs.push(EpochMetrics {
            epoch: epoch + 1,
            train_loss,
            train_accuracy,
            val_loss: validation.loss,
            val_accuracy,
        });
    }

    logger.log_complete(history.best_val_accuracy().unwrap_or(0.0));
    Ok(TrainingOutcome {
        model: model.valid(),
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{BalancedSet, ImageTensor};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn dataset(n: usize) -> XrayDataset {
        let mut tensors = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n {
            let label = if i % 2 == 0 {
                ClassLabel::Normal
            } else {
                ClassLabel::Pneumonia
            };
            let value = if label == ClassLabel::Normal { 0.1 } else { 0.9 };
            tensors.push(ImageTensor::from_flat(vec![value; 64 * 64 * 3], 64, 64, 3).unwrap());
            labels.push(label);
        }
        XrayDataset::from_balanced(BalancedSet {
            tensors,
            labels,
            synthetic: 0,
        })
    }

    #[test]
    fn test_training_records_every_epoch() {
        let device = Default::default();
        let model_config = PneumoniaClassifierConfig::new().with_image_size(64).with_hidden_size(8);
        let config = TrainingConfig {
            epochs: 2,
            batch_size: 4,
            learning_rate: 1e-3,
            seed: 7,
        };

        let outcome =
            train::<TestBackend>(&dataset(6), &dataset(4), &model_config, &config, &device).unwrap();

        assert_eq!(outcome.history.epochs.len(), 2);
        for (i, epoch) in outcome.history.epochs.iter().enumerate() {
            assert_eq!(epoch.epoch, i + 1);
            assert!(epoch.train_loss.is_finite());
            assert!((0.0..=1.0).contains(&epoch.train_accuracy));
            assert!((0.0..=1.0).contains(&epoch.val_accuracy));
        }
        assert!(outcome.history.best_val_accuracy().is_some());
    }

    #[test]
    fn test_empty_training_set() {
        let device = Default::default();
        let result = train::<TestBackend>(
            &XrayDataset::from_records(Vec::new(), 64),
            &dataset(2),
            &PneumoniaClassifierConfig::new().with_image_size(64),
            &TrainingConfig::default(),
            &device,
        );
        assert!(matches!(result, Err(PneumoniaError::Training(_))));
    }

    #[test]
    fn test_history_roundtrip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let history = TrainingHistory {
            epochs: vec![EpochMetrics {
                epoch: 1,
                train_loss: 0.6,
                train_accuracy: 0.7,
                val_loss: 0.5,
                val_accuracy: 0.8,
            }],
        };
        history.save(&path).unwrap();
        let loaded = TrainingHistory::load(&path).unwrap();
        assert_eq!(loaded.best_val_accuracy(), Some(0.8));
    }
}
