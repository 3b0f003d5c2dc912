//! Evaluation metrics for the binary NORMAL / PNEUMONIA task
//!
//! Rows of the confusion matrix are the actual class, columns the predicted
//! class, both indexed by [`ClassLabel::index`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dataset::ClassLabel;

/// 2x2 confusion matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    /// `matrix[actual][predicted]`
    pub matrix: [[usize; 2]; 2],
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parallel slices of predicted and actual labels
    pub fn from_predictions(predictions: &[ClassLabel], ground_truth: &[ClassLabel]) -> Self {
        let mut cm = Self::new();
        for (&pred, &actual) in predictions.iter().zip(ground_truth.iter()) {
            cm.add(actual, pred);
        }
        cm
    }

    /// Record a single prediction
    pub fn add(&mut self, actual: ClassLabel, predicted: ClassLabel) {
        self.matrix[actual.index()][predicted.index()] += 1;
    }

    /// Count at (actual, predicted)
    pub fn get(&self, actual: ClassLabel, predicted: ClassLabel) -> usize {
        self.matrix[actual.index()][predicted.index()]
    }

    pub fn total(&self) -> usize {
        self.matrix.iter().flatten().sum()
    }

    /// Diagonal sum
    pub fn correct(&self) -> usize {
        ClassLabel::ALL.iter().map(|&c| self.get(c, c)).sum()
    }

    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total > 0 {
            self.correct() as f64 / total as f64
        } else {
            0.0
        }
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Confusion Matrix (rows=actual, cols=predicted):")?;
        write!(f, "{:>10}", "")?;
        for predicted in ClassLabel::ALL {
            write!(f, "{:>11}", predicted.name())?;
        }
        writeln!(f)?;
        for actual in ClassLabel::ALL {
            write!(f, "{:>10}", actual.name())?;
            for predicted in ClassLabel::ALL {
                let count = self.get(actual, predicted);
                if actual == predicted {
                    write!(f, "{:>11}", format!("[{}]", count))?;
                } else {
                    write!(f, "{:>11}", count)?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Per-class precision, recall and F1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: ClassLabel,
    pub true_positives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    /// Precision = TP / (TP + FP)
    pub precision: f64,
    /// Recall = TP / (TP + FN)
    pub recall: f64,
    /// F1 = 2 * (precision * recall) / (precision + recall)
    pub f1: f64,
    /// Number of actual samples of this class
    pub support: usize,
}

impl ClassMetrics {
    /// Treat `label` as the positive class of the confusion matrix
    pub fn from_confusion_matrix(cm: &ConfusionMatrix, label: ClassLabel) -> Self {
        let other = label.other();
        let true_positives = cm.get(label, label);
        let false_positives = cm.get(other, label);
        let false_negatives = cm.get(label, other);

        let precision = ratio(true_positives, true_positives + false_positives);
        let recall = ratio(true_positives, true_positives + false_negatives);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            label,
            true_positives,
            false_positives,
            false_negatives,
            precision,
            recall,
            f1,
            support: true_positives + false_negatives,
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den > 0 {
        num as f64 / den as f64
    } else {
        0.0
    }
}

/// Test-set evaluation results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metrics {
    pub total_samples: usize,
    pub correct_predictions: usize,
    pub accuracy: f64,
    /// Mean binary cross-entropy, when the caller tracked it
    pub loss: Option<f64>,
    pub per_class: Vec<ClassMetrics>,
    pub confusion_matrix: ConfusionMatrix,
}

impl Metrics {
    pub fn from_predictions(predictions: &[ClassLabel], ground_truth: &[ClassLabel]) -> Self {
        let confusion_matrix = ConfusionMatrix::from_predictions(predictions, ground_truth);
        let per_class = ClassLabel::ALL
            .iter()
            .map(|&label| ClassMetrics::from_confusion_matrix(&confusion_matrix, label))
            .collect();

        Self {
            total_samples: confusion_matrix.total(),
            correct_predictions: confusion_matrix.correct(),
            accuracy: confusion_matrix.accuracy(),
            loss: None,
            per_class,
            confusion_matrix,
        }
    }

    pub fn with_loss(mut self, loss: f64) -> Self {
        self.loss = Some(loss);
        self
    }

    pub fn class(&self, label: ClassLabel) -> Option<&ClassMetrics> {
        self.per_class.iter().find(|m| m.label == label)
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Accuracy: {:.2}% ({}/{})",
            self.accuracy * 100.0,
            self.correct_predictions,
            self.total_samples
        )?;
        if let Some(loss) = self.loss {
            writeln!(f, "Loss:     {:.4}", loss)?;
        }
        writeln!(
            f,
            "{:>10} {:>10} {:>10} {:>10} {:>8}",
            "class", "precision", "recall", "f1", "support"
        )?;
        for m in &self.per_class {
            writeln!(
                f,
                "{:>10} {:>10.4} {:>10.4} {:>10.4} {:>8}",
                m.label.name(),
                m.precision,
                m.recall,
                m.f1,
                m.support
            )?;
        }
        write!(f, "{}", self.confusion_matrix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ClassLabel::{Normal, Pneumonia};

    #[test]
    fn test_confusion_matrix_counts() {
        let preds = vec![Normal, Pneumonia, Pneumonia, Normal, Pneumonia];
        let truth = vec![Normal, Pneumonia, Normal, Normal, Pneumonia];
        let cm = ConfusionMatrix::from_predictions(&preds, &truth);

        assert_eq!(cm.get(Normal, Normal), 2);
        assert_eq!(cm.get(Normal, Pneumonia), 1);
        assert_eq!(cm.get(Pneumonia, Pneumonia), 2);
        assert_eq!(cm.get(Pneumonia, Normal), 0);
        assert_eq!(cm.total(), 5);
        assert!((cm.accuracy() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_class_metrics() {
        let preds = vec![Normal, Pneumonia, Pneumonia, Normal, Pneumonia];
        let truth = vec![Normal, Pneumonia, Normal, Normal, Pneumonia];
        let metrics = Metrics::from_predictions(&preds, &truth);

        let pneumonia = metrics.class(Pneumonia).unwrap();
        assert!((pneumonia.precision - 2.0 / 3.0).abs() < 1e-9);
        assert!((pneumonia.recall - 1.0).abs() < 1e-9);
        assert_eq!(pneumonia.support, 2);

        let normal = metrics.class(Normal).unwrap();
        assert!((normal.precision - 1.0).abs() < 1e-9);
        assert!((normal.recall - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(normal.support, 3);
    }

    #[test]
    fn test_empty_predictions() {
        let metrics = Metrics::from_predictions(&[], &[]);
        assert_eq!(metrics.total_samples, 0);
        assert_eq!(metrics.accuracy, 0.0);
        assert_eq!(metrics.class(Normal).unwrap().f1, 0.0);
    }

    #[test]
    fn test_display_lists_both_classes() {
        let metrics = Metrics::from_predictions(&[Normal, Pneumonia], &[Normal, Normal]).with_loss(0.5);
        let text = metrics.to_string();
        assert!(text.contains("NORMAL"));
        assert!(text.contains("PNEUMONIA"));
        assert!(text.contains("Loss"));
    }
}
