//! Merge images from several source directories into one directory
//!
//! Used to fold the archive's `train/<CLASS>` and `test/<CLASS>` folders
//! into a single `<CLASS>` folder before deduplication and splitting.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{list_images, ClassLabel};
use crate::utils::error::{PneumoniaError, Result};
use crate::utils::logging::ProgressLogger;

/// What to do when two sources hold a file with the same name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionPolicy {
    /// The later source wins
    #[default]
    Overwrite,
    /// The earlier source wins
    Skip,
    /// Abort the consolidation
    Error,
}

impl std::str::FromStr for CollisionPolicy {
    type Err = PneumoniaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "overwrite" => Ok(CollisionPolicy::Overwrite),
            "skip" => Ok(CollisionPolicy::Skip),
            "error" => Ok(CollisionPolicy::Error),
            other => Err(PneumoniaError::Config(format!(
                "unknown collision policy '{}' (expected overwrite, skip or error)",
                other
            ))),
        }
    }
}

/// A filename provided by more than one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collision {
    pub file_name: String,
    /// Source file written first
    pub first: PathBuf,
    /// Source file that collided with it
    pub second: PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidateReport {
    pub dest_dir: PathBuf,
    /// Files copied, overwrites included
    pub copied: usize,
    pub collisions: Vec<Collision>,
}

/// Copy every image of `sources` into `dest_dir`, overwriting on name collisions
///
/// Collisions are still logged and listed in the report.
pub fn consolidate(sources: &[PathBuf], dest_dir: &Path) -> Result<ConsolidateReport> {
    consolidate_with_policy(sources, dest_dir, CollisionPolicy::default())
}

/// Copy every image of `sources` (in order) into `dest_dir`
///
/// Sources are never modified. A collision is a file name already written by
/// an earlier source during this call. With [`CollisionPolicy::Error`] all
/// names are checked before anything is copied, so a failing call leaves
/// `dest_dir` untouched.
pub fn consolidate_with_policy(
    sources: &[PathBuf],
    dest_dir: &Path,
    policy: CollisionPolicy,
) -> Result<ConsolidateReport> {
    let mut listings = Vec::with_capacity(sources.len());
    for source in sources {
        listings.push(list_images(source)?);
    }
    if policy == CollisionPolicy::Error {
        if let Some((first, second)) = first_collision(&listings) {
            return Err(PneumoniaError::Dataset(format!(
                "file name collision: {:?} and {:?}",
                first, second
            )));
        }
    }
    fs::create_dir_all(dest_dir)?;

    let total: usize = listings.iter().map(Vec::len).sum();
    let mut progress = ProgressLogger::new("Consolidating", total);
    let mut written: HashMap<OsString, PathBuf> = HashMap::new();
    let mut report = ConsolidateReport {
        dest_dir: dest_dir.to_path_buf(),
        ..Default::default()
    };

    for src_path in listings.into_iter().flatten() {
        progress.increment();
        let Some(file_name) = src_path.file_name().map(|n| n.to_os_string()) else {
            continue;
        };

        if let Some(first) = written.get(&file_name) {
            let collision = Collision {
                file_name: file_name.to_string_lossy().to_string(),
                first: first.clone(),
                second: src_path.clone(),
            };
            match policy {
                CollisionPolicy::Skip => {
                    warn!("Collision on '{}', keeping {:?}", collision.file_name, first);
                    report.collisions.push(collision);
                    continue;
                }
                // Error was ruled out before copying
                CollisionPolicy::Overwrite | CollisionPolicy::Error => {
                    warn!(
                        "Collision on '{}', overwriting with {:?}",
                        collision.file_name, src_path
                    );
                    report.collisions.push(collision);
                }
            }
        }

        let dst_path = dest_dir.join(&file_name);
        fs::copy(&src_path, &dst_path)?;
        written.insert(file_name, src_path);
        report.copied += 1;
    }

    progress.finish();
    info!(
        "Consolidated {} files into {:?} ({} collisions)",
        report.copied,
        dest_dir,
        report.collisions.len()
    );
    Ok(report)
}

/// First file name present in more than one listing, as `(earlier, later)`
fn first_collision(listings: &[Vec<PathBuf>]) -> Option<(PathBuf, PathBuf)> {
    let mut seen: HashMap<&OsStr, &PathBuf> = HashMap::new();
    for path in listings.iter().flatten() {
        let Some(name) = path.file_name() else {
            continue;
        };
        if let Some(first) = seen.insert(name, path) {
            return Some((first.clone(), path.clone()));
        }
    }
    None
}

/// Consolidate each class folder of `split_dirs` into `dest_root/<CLASS>`
pub fn consolidate_splits(
    split_dirs: &[PathBuf],
    dest_root: &Path,
    policy: CollisionPolicy,
) -> Result<Vec<(ClassLabel, ConsolidateReport)>> {
    let mut reports = Vec::new();
    for label in ClassLabel::ALL {
        let sources: Vec<PathBuf> = split_dirs.iter().map(|d| d.join(label.name())).collect();
        let report = consolidate_with_policy(&sources, &dest_root.join(label.name()), policy)?;
        reports.push((label, report));
    }
    Ok(reports)
}
