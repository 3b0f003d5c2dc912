//! Dataset module for chest X-ray data handling
//!
//! This module provides functionality for:
//! - Extracting the source zip archive
//! - Perceptual-hash duplicate detection and removal
//! - Consolidating the archive's train/test folders into one tree
//! - Indexing, splitting, loading and SMOTE balancing
//! - Burn `Dataset` / `Batcher` integration
//!
//! ## Directory layout
//!
//! Every class-aware stage expects a root holding one folder per class:
//!
//! ```text
//! root/
//! ├── NORMAL/
//! │   ├── IM-0001-0001.jpeg
//! │   └── ...
//! └── PNEUMONIA/
//!     └── ...
//! ```

pub mod archive;
pub mod balance;
pub mod burn_dataset;
pub mod consolidate;
pub mod dedup;
pub mod loader;
pub mod preprocess;
pub mod split;

#[cfg(test)]
pub(crate) mod test_images;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::utils::error::{PneumoniaError, Result};

// Re-export main types for convenience
pub use archive::{extract_archive, find_split_dirs, ExtractStats};
pub use balance::{balance, BalancedSet, SmoteConfig};
pub use burn_dataset::{XrayBatch, XrayBatcher, XrayDataset, XrayItem};
pub use consolidate::{
    consolidate, consolidate_splits, consolidate_with_policy, CollisionPolicy, ConsolidateReport,
};
pub use dedup::{count_duplicates, remove_duplicates, DuplicateReport, HashRegistry};
pub use loader::{ClassCounts, DatasetTable, ImageRecord};
pub use preprocess::{decode_image_bytes, load_image_tensor, load_image_tensors, ImageTensor, LoadedImages};
pub use split::{split_dataset, DatasetSplits, SplitConfig};

/// File extensions (lowercase) treated as images by every stage
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpeg", "jpg", "png"];

/// Diagnosis label of a chest X-ray
///
/// This is the only place where labels are mapped to integers or names:
///
/// | variant     | index | directory / display name |
/// |-------------|-------|--------------------------|
/// | `Normal`    | 0     | `NORMAL`                 |
/// | `Pneumonia` | 1     | `PNEUMONIA`              |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClassLabel {
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "PNEUMONIA")]
    Pneumonia,
}

impl ClassLabel {
    /// All labels in index order
    pub const ALL: [ClassLabel; 2] = [ClassLabel::Normal, ClassLabel::Pneumonia];

    pub fn index(self) -> usize {
        match self {
            ClassLabel::Normal => 0,
            ClassLabel::Pneumonia => 1,
        }
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Directory name, also used for display and in API responses
    pub fn name(self) -> &'static str {
        match self {
            ClassLabel::Normal => "NORMAL",
            ClassLabel::Pneumonia => "PNEUMONIA",
        }
    }

    pub fn from_dir_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|label| label.name() == name)
    }

    /// The opposite label
    pub fn other(self) -> Self {
        match self {
            ClassLabel::Normal => ClassLabel::Pneumonia,
            ClassLabel::Pneumonia => ClassLabel::Normal,
        }
    }

    /// Label for a sigmoid output, `PNEUMONIA` when `probability >= threshold`
    pub fn from_probability(probability: f32, threshold: f32) -> Self {
        if probability >= threshold {
            ClassLabel::Pneumonia
        } else {
            ClassLabel::Normal
        }
    }

    /// Training target for binary cross-entropy
    pub fn target(self) -> f32 {
        self.index() as f32
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether `path` has one of the [`IMAGE_EXTENSIONS`] (case-insensitive)
pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Image files directly inside `dir`, in lexicographic filename order
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(PneumoniaError::PathNotFound(dir.to_path_buf()));
    }

    let mut images = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| PneumoniaError::Dataset(e.to_string()))?;
        if entry.file_type().is_file() && is_image_file(entry.path()) {
            images.push(entry.into_path());
        }
    }

    Ok(images)
}
