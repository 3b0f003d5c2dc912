//! Dataset indexing
//!
//! Walks a consolidated tree and records one `(path, label)` pair per image.
//! Labels come only from the class directory an image sits in.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{list_images, ClassLabel};
use crate::utils::error::{PneumoniaError, Result};

/// One indexed image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub path: PathBuf,
    pub label: ClassLabel,
}

impl ImageRecord {
    pub fn new(path: impl Into<PathBuf>, label: ClassLabel) -> Self {
        Self {
            path: path.into(),
            label,
        }
    }
}

/// Number of samples per class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassCounts {
    pub normal: usize,
    pub pneumonia: usize,
}

impl ClassCounts {
    pub fn from_labels<'a>(labels: impl IntoIterator<Item = &'a ClassLabel>) -> Self {
        let mut counts = Self::default();
        for label in labels {
            counts.add(*label);
        }
        counts
    }

    pub fn add(&mut self, label: ClassLabel) {
        match label {
            ClassLabel::Normal => self.normal += 1,
            ClassLabel::Pneumonia => self.pneumonia += 1,
        }
    }

    pub fn get(&self, label: ClassLabel) -> usize {
        match label {
            ClassLabel::Normal => self.normal,
            ClassLabel::Pneumonia => self.pneumonia,
        }
    }

    pub fn total(&self) -> usize {
        self.normal + self.pneumonia
    }
}

impl fmt::Display for ClassCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}, {}: {}",
            ClassLabel::Normal,
            self.normal,
            ClassLabel::Pneumonia,
            self.pneumonia
        )
    }
}

/// Ordered `(path, label)` table of a consolidated dataset
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatasetTable {
    pub records: Vec<ImageRecord>,
}

impl DatasetTable {
    pub fn new(records: Vec<ImageRecord>) -> Self {
        Self { records }
    }

    /// Index `root/NORMAL` and `root/PNEUMONIA`
    ///
    /// NORMAL records come first, each class in filename order. Both class
    /// directories must exist.
    pub fn from_directory(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        info!("Indexing dataset at {:?}", root);

        let mut records = Vec::new();
        for label in ClassLabel::ALL {
            let class_dir = root.join(label.name());
            if !class_dir.is_dir() {
                return Err(PneumoniaError::PathNotFound(class_dir));
            }
            let images = list_images(&class_dir)?;
            debug!("{}: {} images", label, images.len());
            records.extend(images.into_iter().map(|path| ImageRecord::new(path, label)));
        }

        let table = Self { records };
        info!("Indexed {} images ({})", table.len(), table.class_counts());
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn class_counts(&self) -> ClassCounts {
        ClassCounts::from_labels(self.records.iter().map(|r| &r.label))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageRecord> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_from_directory_orders_by_class_then_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("NORMAL")).unwrap();
        fs::create_dir_all(dir.path().join("PNEUMONIA")).unwrap();
        fs::write(dir.path().join("PNEUMONIA/a.jpeg"), b"x").unwrap();
        fs::write(dir.path().join("NORMAL/z.jpeg"), b"x").unwrap();
        fs::write(dir.path().join("NORMAL/m.png"), b"x").unwrap();
        fs::write(dir.path().join("NORMAL/.DS_Store"), b"x").unwrap();

        let table = DatasetTable::from_directory(dir.path()).unwrap();
        let labels: Vec<ClassLabel> = table.iter().map(|r| r.label).collect();
        assert_eq!(
            labels,
            vec![ClassLabel::Normal, ClassLabel::Normal, ClassLabel::Pneumonia]
        );
        assert_eq!(table.records[0].path, dir.path().join("NORMAL/m.png"));
        assert_eq!(
            table.class_counts(),
            ClassCounts {
                normal: 2,
                pneumonia: 1
            }
        );
    }

    #[test]
    fn test_missing_class_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("NORMAL")).unwrap();
        let err = DatasetTable::from_directory(dir.path()).unwrap_err();
        assert!(matches!(err, PneumoniaError::PathNotFound(p) if p.ends_with("PNEUMONIA")));
    }

    #[test]
    fn test_class_counts_display() {
        let counts = ClassCounts::from_labels(&[ClassLabel::Pneumonia, ClassLabel::Pneumonia]);
        assert_eq!(counts.to_string(), "NORMAL: 0, PNEUMONIA: 2");
        assert_eq!(counts.total(), 2);
    }
}
