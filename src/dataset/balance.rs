//! SMOTE class balancing
//!
//! Synthetic minority oversampling: every synthetic sample lies on the segment
//! between a minority sample and one of its `k` nearest minority neighbors.
//! Majority samples and original minority samples are never modified; the
//! synthetic samples are appended after the originals.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::loader::ClassCounts;
use super::preprocess::ImageTensor;
use super::ClassLabel;
use crate::utils::error::{PneumoniaError, Result};

/// SMOTE parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoteConfig {
    /// Neighbors considered per minority sample
    pub k_neighbors: usize,
    /// Fixed seed for reproducible sampling, `None` for entropy
    pub seed: Option<u64>,
}

impl Default for SmoteConfig {
    fn default() -> Self {
        Self {
            k_neighbors: 5,
            seed: Some(42),
        }
    }
}

/// Training set with equal class counts
#[derive(Debug)]
pub struct BalancedSet {
    pub tensors: Vec<ImageTensor>,
    pub labels: Vec<ClassLabel>,
    /// Number of synthetic samples appended at the end
    pub synthetic: usize,
}

impl BalancedSet {
    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn class_counts(&self) -> ClassCounts {
        ClassCounts::from_labels(&self.labels)
    }
}

fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Positions (into `samples`) of the `k` nearest other samples of each sample
///
/// Ties are broken by position.
fn nearest_neighbors(samples: &[&[f32]], k: usize) -> Vec<Vec<usize>> {
    samples
        .par_iter()
        .enumerate()
        .map(|(i, sample)| {
            let mut distances: Vec<(f32, usize)> = samples
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i)
                .map(|(j, other)| (squared_distance(sample, other), j))
                .collect();
            distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            distances.into_iter().take(k).map(|(_, j)| j).collect()
        })
        .collect()
}

/// Oversample the minority class until both classes have the majority count
///
/// Input tensors are consumed. Output keeps every original sample in order,
/// followed by `majority - minority` synthetic minority samples. Already
/// balanced input is returned unchanged.
pub fn balance(
    tensors: Vec<ImageTensor>,
    labels: Vec<ClassLabel>,
    config: &SmoteConfig,
) -> Result<BalancedSet> {
    if tensors.len() != labels.len() {
        return Err(PneumoniaError::InvalidInput(format!(
            "{} tensors but {} labels",
            tensors.len(),
            labels.len()
        )));
    }
    let Some(first) = tensors.first() else {
        return Err(PneumoniaError::InvalidInput(
            "cannot balance an empty training set".to_string(),
        ));
    };
    let (height, width, channels) = first.shape();
    if let Some(other) = tensors.iter().find(|t| t.shape() != (height, width, channels)) {
        return Err(PneumoniaError::InvalidInput(format!(
            "mixed tensor shapes {:?} and {:?}",
            (height, width, channels),
            other.shape()
        )));
    }

    let counts = ClassCounts::from_labels(&labels);
    info!("Before balancing: {}", counts);
    if counts.normal == counts.pneumonia {
        return Ok(BalancedSet {
            tensors,
            labels,
            synthetic: 0,
        });
    }

    let minority = if counts.normal < counts.pneumonia {
        ClassLabel::Normal
    } else {
        ClassLabel::Pneumonia
    };
    let minority_count = counts.get(minority);
    let n_synthetic = counts.get(minority.other()) - minority_count;
    let k = config.k_neighbors;
    if k == 0 || minority_count <= k {
        return Err(PneumoniaError::Config(format!(
            "SMOTE needs more minority samples than k_neighbors ({} {} samples, k = {})",
            minority_count, minority, k
        )));
    }

    let flat: Vec<Vec<f32>> = tensors.into_iter().map(ImageTensor::into_flat).collect();
    let synthetic_flat = {
        let minority_samples: Vec<&[f32]> = flat
            .iter()
            .zip(&labels)
            .filter(|(_, label)| **label == minority)
            .map(|(sample, _)| sample.as_slice())
            .collect();
        let neighbors = nearest_neighbors(&minority_samples, k);

        let mut rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let mut synthetic = Vec::with_capacity(n_synthetic);
        for _ in 0..n_synthetic {
            let base = rng.gen_range(0..minority_count);
            let neighbor = neighbors[base][rng.gen_range(0..k)];
            let gap: f32 = rng.gen();
            let x = minority_samples[base];
            let nb = minority_samples[neighbor];
            synthetic.push(
                x.iter()
                    .zip(nb)
                    .map(|(xi, ni)| xi + gap * (ni - xi))
                    .collect::<Vec<f32>>(),
            );
        }
        synthetic
    };

    let mut out_labels = labels;
    out_labels.extend(std::iter::repeat(minority).take(n_synthetic));
    let out_tensors = flat
        .into_iter()
        .chain(synthetic_flat)
        .map(|data| ImageTensor::from_flat(data, height, width, channels))
        .collect::<Result<Vec<_>>>()?;

    let balanced = BalancedSet {
        tensors: out_tensors,
        labels: out_labels,
        synthetic: n_synthetic,
    };
    info!(
        "After balancing: {} ({} synthetic {} samples)",
        balanced.class_counts(),
        n_synthetic,
        minority
    );
    Ok(balanced)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(values: [f32; 4]) -> ImageTensor {
        ImageTensor::from_flat(values.to_vec(), 1, 2, 2).unwrap()
    }

    fn sample_set(n_normal: usize, n_pneumonia: usize) -> (Vec<ImageTensor>, Vec<ClassLabel>) {
        let mut tensors = Vec::new();
        let mut labels = Vec::new();
        for i in 0..n_normal {
            let v = i as f32 / (n_normal as f32 * 2.0);
            tensors.push(tensor([v, v, 0.0, 0.1]));
            labels.push(ClassLabel::Normal);
        }
        for i in 0..n_pneumonia {
            let v = 0.5 + i as f32 / (n_pneumonia as f32 * 2.0);
            tensors.push(tensor([v, 1.0 - v, v, 0.9]));
            labels.push(ClassLabel::Pneumonia);
        }
        (tensors, labels)
    }

    #[test]
    fn test_balance_equalizes_counts_and_keeps_originals() {
        let (tensors, labels) = sample_set(6, 20);
        let originals = tensors.clone();

        let balanced = balance(tensors, labels, &SmoteConfig::default()).unwrap();
        assert_eq!(balanced.len(), 40);
        assert_eq!(balanced.synthetic, 14);
        assert_eq!(balanced.class_counts().normal, 20);
        assert_eq!(balanced.class_counts().pneumonia, 20);
        assert_eq!(&balanced.tensors[..26], &originals[..]);
        assert!(balanced.labels[26..].iter().all(|&l| l == ClassLabel::Normal));
    }

    #[test]
    fn test_synthetic_samples_lie_within_minority_range() {
        let (tensors, labels) = sample_set(6, 12);
        let balanced = balance(tensors, labels, &SmoteConfig::default()).unwrap();

        for synthetic in &balanced.tensors[18..] {
            assert_eq!(synthetic.shape(), (1, 2, 2));
            let v = synthetic.as_slice();
            assert!(v[0] >= 0.0 && v[0] < 0.5);
            assert!((v[0] - v[1]).abs() < 1e-6);
            assert_eq!(v[2], 0.0);
            assert!((v[3] - 0.1).abs() < 1e-6);
        }
    }

    #[test]
    fn test_balance_is_deterministic_with_seed() {
        let (t1, l1) = sample_set(7, 15);
        let (t2, l2) = sample_set(7, 15);
        let a = balance(t1, l1, &SmoteConfig::default()).unwrap();
        let b = balance(t2, l2, &SmoteConfig::default()).unwrap();
        assert_eq!(a.tensors, b.tensors);
    }

    #[test]
    fn test_already_balanced_is_unchanged() {
        let (tensors, labels) = sample_set(4, 4);
        let originals = tensors.clone();
        let balanced = balance(tensors, labels, &SmoteConfig::default()).unwrap();
        assert_eq!(balanced.synthetic, 0);
        assert_eq!(balanced.tensors, originals);
    }

    #[test]
    fn test_minority_not_larger_than_k() {
        let (tensors, labels) = sample_set(5, 20);
        let result = balance(tensors, labels, &SmoteConfig::default());
        assert!(matches!(result, Err(PneumoniaError::Config(_))));
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            balance(Vec::new(), Vec::new(), &SmoteConfig::default()),
            Err(PneumoniaError::InvalidInput(_))
        ));

        let mixed = vec![
            tensor([0.0; 4]),
            ImageTensor::from_flat(vec![0.0; 3], 1, 1, 3).unwrap(),
        ];
        assert!(matches!(
            balance(mixed, vec![ClassLabel::Normal, ClassLabel::Pneumonia], &SmoteConfig::default()),
            Err(PneumoniaError::InvalidInput(_))
        ));

        assert!(matches!(
            balance(vec![tensor([0.0; 4])], Vec::new(), &SmoteConfig::default()),
            Err(PneumoniaError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_nearest_neighbors_tie_break() {
        let a = [0.0f32];
        let b = [1.0f32];
        let c = [-1.0f32];
        let samples: Vec<&[f32]> = vec![&a, &b, &c];
        let neighbors = nearest_neighbors(&samples, 2);
        assert_eq!(neighbors[0], vec![1, 2]);
        assert_eq!(neighbors[1], vec![0, 2]);
    }
}
