//! Train / validation / test splitting
//!
//! Shuffle-then-cut without replacement, applied twice: the test set is cut
//! from a permutation of the whole table, then the validation set is cut from
//! a permutation of what remains. No stratification.

use std::fs;
use std::path::Path;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::loader::{ClassCounts, DatasetTable, ImageRecord};
use crate::utils::error::{PneumoniaError, Result};

/// Configuration for dataset splitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of the whole table held out for testing
    pub test_fraction: f64,
    /// Fraction of the non-test remainder used for validation
    pub validation_fraction: f64,
    /// Fixed seed for a reproducible split, `None` for entropy
    pub seed: Option<u64>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.3,
            validation_fraction: 0.3,
            seed: Some(42),
        }
    }
}

impl SplitConfig {
    /// Both fractions must lie in `[0, 1)`
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("test_fraction", self.test_fraction),
            ("validation_fraction", self.validation_fraction),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(PneumoniaError::Config(format!(
                    "{} must be in [0, 1), got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Disjoint partitions of a [`DatasetTable`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSplits {
    pub train: Vec<ImageRecord>,
    pub validation: Vec<ImageRecord>,
    pub test: Vec<ImageRecord>,
    /// Configuration used to create these splits
    pub config: SplitConfig,
}

impl DatasetSplits {
    pub fn total(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    pub fn train_counts(&self) -> ClassCounts {
        ClassCounts::from_labels(self.train.iter().map(|r| &r.label))
    }

    pub fn validation_counts(&self) -> ClassCounts {
        ClassCounts::from_labels(self.validation.iter().map(|r| &r.label))
    }

    pub fn test_counts(&self) -> ClassCounts {
        ClassCounts::from_labels(self.test.iter().map(|r| &r.label))
    }

    /// Log the label distribution of every partition
    pub fn log_distribution(&self) {
        info!("Train:      {} ({})", self.train.len(), self.train_counts());
        info!("Validation: {} ({})", self.validation.len(), self.validation_counts());
        info!("Test:       {} ({})", self.test.len(), self.test_counts());
    }

    /// Save splits to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("Saved splits to {:?}", path);
        Ok(())
    }

    /// Load splits from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PneumoniaError::PathNotFound(path.to_path_buf()));
        }
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Number of items in a cut of `fraction` of `n`, rounded up
fn cut_size(fraction: f64, n: usize) -> usize {
    // tolerance keeps e.g. 0.3 * 10 at 3 despite float error
    let size = (fraction * n as f64 - 1e-9).ceil().max(0.0) as usize;
    size.min(n)
}

fn shuffle_and_cut(
    mut records: Vec<ImageRecord>,
    fraction: f64,
    rng: &mut ChaCha8Rng,
) -> (Vec<ImageRecord>, Vec<ImageRecord>) {
    records.shuffle(rng);
    let n_cut = cut_size(fraction, records.len());
    let rest = records.split_off(n_cut);
    (records, rest)
}

/// Partition `table` into train, validation and test sets
pub fn split_dataset(table: &DatasetTable, config: &SplitConfig) -> Result<DatasetSplits> {
    config.validate()?;
    if table.is_empty() {
        return Err(PneumoniaError::Dataset(
            "No images provided for splitting".to_string(),
        ));
    }

    let mut rng = match config.seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    };

    let (test, rest) = shuffle_and_cut(table.records.clone(), config.test_fraction, &mut rng);
    let (validation, train) = shuffle_and_cut(rest, config.validation_fraction, &mut rng);

    let splits = DatasetSplits {
        train,
        validation,
        test,
        config: config.clone(),
    };
    info!(
        "Split {} images into {} train / {} validation / {} test",
        table.len(),
        splits.train.len(),
        splits.validation.len(),
        splits.test.len()
    );
    Ok(splits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ClassLabel;
    use std::collections::HashSet;

    fn table(n: usize) -> DatasetTable {
        DatasetTable::new(
            (0..n)
                .map(|i| {
                    let label = if i % 3 == 0 {
                        ClassLabel::Pneumonia
                    } else {
                        ClassLabel::Normal
                    };
                    ImageRecord::new(format!("img_{:03}.jpeg", i), label)
                })
                .collect(),
        )
    }

    #[test]
    fn test_sizes_and_disjointness() {
        let table = table(100);
        let splits = split_dataset(&table, &SplitConfig::default()).unwrap();

        assert_eq!(splits.test.len(), 30);
        assert_eq!(splits.validation.len(), 21);
        assert_eq!(splits.train.len(), 49);
        assert_eq!(splits.total(), 100);

        let mut seen = HashSet::new();
        for record in splits.train.iter().chain(&splits.validation).chain(&splits.test) {
            assert!(seen.insert(record.path.clone()), "duplicate {:?}", record.path);
        }
    }

    #[test]
    fn test_seeded_split_is_reproducible() {
        let table = table(40);
        let a = split_dataset(&table, &SplitConfig::default()).unwrap();
        let b = split_dataset(&table, &SplitConfig::default()).unwrap();
        assert_eq!(a.test, b.test);
        assert_eq!(a.validation, b.validation);
        assert_eq!(a.train, b.train);
    }

    #[test]
    fn test_unseeded_split_keeps_invariants() {
        let config = SplitConfig {
            seed: None,
            ..Default::default()
        };
        let splits = split_dataset(&table(17), &config).unwrap();
        assert_eq!(splits.total(), 17);
    }

    #[test]
    fn test_invalid_fractions() {
        let config = SplitConfig {
            test_fraction: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            split_dataset(&table(10), &config),
            Err(PneumoniaError::Config(_))
        ));

        let config = SplitConfig {
            validation_fraction: -0.1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_table() {
        let result = split_dataset(&DatasetTable::default(), &SplitConfig::default());
        assert!(matches!(result, Err(PneumoniaError::Dataset(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("splits.json");
        let splits = split_dataset(&table(10), &SplitConfig::default()).unwrap();
        splits.save(&path).unwrap();

        let loaded = DatasetSplits::load(&path).unwrap();
        assert_eq!(loaded.test, splits.test);
        assert_eq!(loaded.config, splits.config);
    }

    #[test]
    fn test_cut_size_rounds_up() {
        assert_eq!(cut_size(0.3, 10), 3);
        assert_eq!(cut_size(0.3, 12), 4);
        assert_eq!(cut_size(0.0, 12), 0);
    }
}
