//! Zip archive extraction
//!
//! The source dataset ships as one zip holding `train/` and `test/` folders
//! (optionally below a single top-level folder), each with a `NORMAL/` and a
//! `PNEUMONIA/` class directory.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::ClassLabel;
use crate::utils::error::{PneumoniaError, Result};

/// What an extraction wrote to disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractStats {
    pub files: usize,
    pub directories: usize,
}

/// Extract every entry of `zip_path` into `dest_dir`, preserving relative paths
///
/// `dest_dir` is created if absent. Entries whose names would escape
/// `dest_dir` (absolute paths or `..` components) abort the extraction.
pub fn extract_archive(zip_path: &Path, dest_dir: &Path) -> Result<ExtractStats> {
    if !zip_path.is_file() {
        return Err(PneumoniaError::PathNotFound(zip_path.to_path_buf()));
    }
    info!("Extracting {:?} into {:?}", zip_path, dest_dir);

    let file = File::open(zip_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| PneumoniaError::Archive(format!("{:?}: {}", zip_path, e)))?;

    fs::create_dir_all(dest_dir)?;

    let mut stats = ExtractStats::default();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| PneumoniaError::Archive(format!("entry {}: {}", index, e)))?;

        let relative = entry.enclosed_name().ok_or_else(|| {
            PneumoniaError::Archive(format!("unsafe entry path: {}", entry.name()))
        })?;
        let out_path = dest_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            stats.directories += 1;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out_file = File::create(&out_path)?;
        io::copy(&mut entry, &mut out_file)?;
        stats.files += 1;
        debug!("Extracted {:?}", out_path);
    }

    info!(
        "Extracted {} files and {} directories",
        stats.files, stats.directories
    );
    Ok(stats)
}

/// Directories below `root` (at most two levels deep) holding a folder per class
///
/// For an extracted archive these are its `train/` and `test/` splits.
/// `train` comes first and `test` second, any other folder follows in path
/// order. Consolidation copies in this order, so with
/// [`CollisionPolicy::Overwrite`](super::CollisionPolicy) the test copy of a
/// clashing file name survives.
pub fn find_split_dirs(root: &Path) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(PneumoniaError::PathNotFound(root.to_path_buf()));
    }

    let mut dirs = Vec::new();
    for entry in WalkDir::new(root).max_depth(2).sort_by_file_name() {
        let entry = entry.map_err(|e| PneumoniaError::Dataset(e.to_string()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let has_all_classes = ClassLabel::ALL
            .iter()
            .all(|label| entry.path().join(label.name()).is_dir());
        if has_all_classes {
            dirs.push(entry.into_path());
        }
    }

    if dirs.is_empty() {
        return Err(PneumoniaError::Dataset(format!(
            "no directory with NORMAL/ and PNEUMONIA/ folders under {:?}",
            root
        )));
    }
    // walk order is by name, the stable sort keeps it within a rank
    dirs.sort_by_key(|dir| split_rank(dir));
    Ok(dirs)
}

fn split_rank(dir: &Path) -> u8 {
    match dir.file_name().and_then(|n| n.to_str()) {
        Some("train") => 0,
        Some("test") => 1,
        _ => 2,
    }
}
