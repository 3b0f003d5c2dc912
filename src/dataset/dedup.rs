//! Perceptual-hash duplicate detection and removal
//!
//! Each image is reduced to a 64-bit average hash (8x8 grayscale, one bit per
//! pixel above the mean). Two images with the same hash are treated as
//! duplicates; the first one seen in filename order is the original.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use image_hasher::{HashAlg, Hasher, HasherConfig, ImageHash};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::list_images;
use crate::utils::error::{PneumoniaError, Result};
use crate::utils::logging::ProgressLogger;

/// Build the 8x8 mean hasher shared by detection and removal
fn average_hasher() -> Hasher {
    HasherConfig::new()
        .hash_size(8, 8)
        .hash_alg(HashAlg::Mean)
        .to_hasher()
}

/// Decode `path` and compute its average hash
pub fn average_hash(path: &Path) -> Result<ImageHash> {
    let image = image::open(path)
        .map_err(|e| PneumoniaError::Decode(path.to_path_buf(), e.to_string()))?;
    Ok(average_hasher().hash_image(&image))
}

/// First-seen path for each hash, scoped to one pass over one directory
#[derive(Debug, Default)]
pub struct HashRegistry {
    seen: HashMap<ImageHash, PathBuf>,
}

impl HashRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path` under `hash`
    ///
    /// Returns the original path if the hash was already registered, in which
    /// case the registry is left unchanged.
    pub fn register(&mut self, hash: ImageHash, path: &Path) -> Option<PathBuf> {
        if let Some(original) = self.seen.get(&hash) {
            return Some(original.clone());
        }
        self.seen.insert(hash, path.to_path_buf());
        None
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// A later-seen image whose hash matches an earlier one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicatePair {
    pub duplicate: PathBuf,
    pub original: PathBuf,
}

/// Outcome of one hashing pass over a class directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicateReport {
    pub class_dir: PathBuf,
    /// Images successfully hashed
    pub scanned: usize,
    /// Images whose hash was already registered
    pub duplicates: usize,
    /// Duplicates deleted from disk (always 0 for [`count_duplicates`])
    pub removed: usize,
    /// Files that could not be decoded
    pub skipped: usize,
    pub pairs: Vec<DuplicatePair>,
}

impl DuplicateReport {
    /// Images left that have a unique hash
    pub fn unique(&self) -> usize {
        self.scanned - self.duplicates
    }
}

/// Count duplicate images in `class_dir` without touching the files
pub fn count_duplicates(class_dir: &Path) -> Result<DuplicateReport> {
    scan_duplicates(class_dir, false)
}

/// Delete every later-seen duplicate in `class_dir`
///
/// The first image of each hash survives. Deletion is irreversible; running
/// this twice removes nothing the second time.
pub fn remove_duplicates(class_dir: &Path) -> Result<DuplicateReport> {
    scan_duplicates(class_dir, true)
}

fn scan_duplicates(class_dir: &Path, remove: bool) -> Result<DuplicateReport> {
    let images = list_images(class_dir)?;
    let hasher = average_hasher();
    let mut registry = HashRegistry::new();
    let mut report = DuplicateReport {
        class_dir: class_dir.to_path_buf(),
        ..Default::default()
    };

    let operation = if remove { "Removing duplicates" } else { "Hashing" };
    let mut progress = ProgressLogger::new(operation, images.len());

    for path in images {
        progress.increment();

        let image = match image::open(&path) {
            Ok(image) => image,
            Err(e) => {
                warn!("Skipping undecodable image {:?}: {}", path, e);
                report.skipped += 1;
                continue;
            }
        };
        let hash = hasher.hash_image(&image);
        drop(image);
        report.scanned += 1;

        if let Some(original) = registry.register(hash, &path) {
            debug!("{:?} duplicates {:?}", path, original);
            report.duplicates += 1;
            if remove {
                fs::remove_file(&path)?;
                report.removed += 1;
            }
            report.pairs.push(DuplicatePair {
                duplicate: path,
                original,
            });
        }
    }

    progress.finish();
    info!(
        "{:?}: {} images, {} duplicates, {} removed, {} skipped",
        class_dir, report.scanned, report.duplicates, report.removed, report.skipped
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::test_images::write_block_image;

    #[test]
    fn test_count_duplicates_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        write_block_image(&dir.path().join("a.png"), 1);
        write_block_image(&dir.path().join("b.png"), 2);
        fs::copy(dir.path().join("a.png"), dir.path().join("c.png")).unwrap();

        let report = count_duplicates(dir.path()).unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.removed, 0);
        assert_eq!(report.unique(), 2);
        assert_eq!(
            report.pairs,
            vec![DuplicatePair {
                duplicate: dir.path().join("c.png"),
                original: dir.path().join("a.png"),
            }]
        );
        assert!(dir.path().join("c.png").exists());
    }

    #[test]
    fn test_remove_duplicates_keeps_first_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        write_block_image(&dir.path().join("b.png"), 7);
        fs::copy(dir.path().join("b.png"), dir.path().join("a.png")).unwrap();
        fs::copy(dir.path().join("b.png"), dir.path().join("c.png")).unwrap();

        let first = remove_duplicates(dir.path()).unwrap();
        assert_eq!(first.removed, 2);
        assert!(dir.path().join("a.png").exists());
        assert!(!dir.path().join("b.png").exists());
        assert!(!dir.path().join("c.png").exists());

        let second = remove_duplicates(dir.path()).unwrap();
        assert_eq!(second.removed, 0);
        assert_eq!(second.scanned, 1);
    }

    #[test]
    fn test_undecodable_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write_block_image(&dir.path().join("a.png"), 3);
        fs::write(dir.path().join("broken.jpeg"), b"not an image").unwrap();
        fs::write(dir.path().join("readme.txt"), b"ignored").unwrap();

        let report = remove_duplicates(dir.path()).unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.skipped, 1);
        assert!(dir.path().join("broken.jpeg").exists());
        assert!(dir.path().join("readme.txt").exists());
    }

    #[test]
    fn test_registry_returns_original() {
        let dir = tempfile::tempdir().unwrap();
        write_block_image(&dir.path().join("a.png"), 11);
        let hash = average_hash(&dir.path().join("a.png")).unwrap();

        let mut registry = HashRegistry::new();
        assert_eq!(registry.register(hash.clone(), Path::new("first")), None);
        assert_eq!(
            registry.register(hash, Path::new("second")),
            Some(PathBuf::from("first"))
        );
        assert_eq!(registry.len(), 1);
    }
}
