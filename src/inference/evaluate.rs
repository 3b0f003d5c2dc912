//! Batched evaluation of a model over a dataset

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::tensor::{activation::sigmoid, backend::Backend, ElementConversion};

use crate::dataset::{ClassLabel, XrayBatch, XrayBatcher, XrayDataset};
use crate::model::PneumoniaClassifier;
use crate::training::loss::binary_cross_entropy_with_logits;
use crate::utils::error::{PneumoniaError, Result};
use crate::utils::metrics::Metrics;
use crate::DECISION_THRESHOLD;

/// Per-sample outputs of an evaluation pass
#[derive(Debug, Clone, Default)]
pub struct EvaluationOutcome {
    pub labels: Vec<ClassLabel>,
    pub predictions: Vec<ClassLabel>,
    /// P(PNEUMONIA) per sample
    pub probabilities: Vec<f32>,
    /// Mean binary cross-entropy over all samples
    pub loss: f64,
}

impl EvaluationOutcome {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn accuracy(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let correct = self
            .predictions
            .iter()
            .zip(&self.labels)
            .filter(|(p, l)| p == l)
            .count();
        correct as f64 / self.len() as f64
    }

    pub fn metrics(&self) -> Metrics {
        Metrics::from_predictions(&self.predictions, &self.labels).with_loss(self.loss)
    }
}

/// Run `model` over every loadable item of `dataset`
///
/// Items that fail to load are skipped by the dataset itself.
pub fn evaluate_model<B: Backend>(
    model: &PneumoniaClassifier<B>,
    dataset: &XrayDataset,
    batch_size: usize,
    image_size: usize,
    device: &B::Device,
) -> Result<EvaluationOutcome> {
    if batch_size == 0 {
        return Err(PneumoniaError::Config("batch_size must be positive".to_string()));
    }

    let batcher = XrayBatcher::new(image_size);
    let len = dataset.len();
    let mut outcome = EvaluationOutcome::default();
    let mut loss_sum = 0.0f64;

    for start in (0..len).step_by(batch_size) {
        let end = (start + batch_size).min(len);
        let items: Vec<_> = (start..end).filter_map(|i| dataset.get(i)).collect();
        if items.is_empty() {
            continue;
        }

        let batch: XrayBatch<B> = batcher.batch(items, device);
        let count = batch.labels.len();
        let logits = model.forward(batch.images);

        let loss: f64 = binary_cross_entropy_with_logits(logits.clone(), batch.targets)
            .into_scalar()
            .elem();
        loss_sum += loss * count as f64;

        let probabilities = sigmoid(logits)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PneumoniaError::Inference(format!("{:?}", e)))?;
        outcome.predictions.extend(
            probabilities
                .iter()
                .map(|&p| ClassLabel::from_probability(p, DECISION_THRESHOLD)),
        );
        outcome.probabilities.extend(probabilities);
        outcome.labels.extend(batch.labels);
    }

    if !outcome.is_empty() {
        outcome.loss = loss_sum / outcome.len() as f64;
    }
    Ok(outcome)
}
