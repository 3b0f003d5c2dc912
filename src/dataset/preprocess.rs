//! Image loading and normalization
//!
//! Every image is decoded, resized to a fixed resolution, converted to RGB and
//! scaled to `[0, 1]`. Tensors are kept row-major HWC; the batcher permutes to
//! NCHW when building model input.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use super::loader::{ClassCounts, ImageRecord};
use super::ClassLabel;
use crate::utils::error::{PneumoniaError, Result};
use crate::IMAGE_CHANNELS;

/// Normalized image with shape `(height, width, channels)`
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    data: Vec<f32>,
    height: usize,
    width: usize,
    channels: usize,
}

impl ImageTensor {
    /// Wrap row-major HWC `data`, checking its length against the shape
    pub fn from_flat(data: Vec<f32>, height: usize, width: usize, channels: usize) -> Result<Self> {
        if data.len() != height * width * channels {
            return Err(PneumoniaError::InvalidInput(format!(
                "expected {} values for shape ({}, {}, {}), got {}",
                height * width * channels,
                height,
                width,
                channels,
                data.len()
            )));
        }
        Ok(Self {
            data,
            height,
            width,
            channels,
        })
    }

    /// Resize and normalize an already decoded image
    pub fn from_image(image: &DynamicImage, height: usize, width: usize) -> Self {
        let rgb = image
            .resize_exact(width as u32, height as u32, FilterType::Triangle)
            .to_rgb8();
        let data = rgb.into_raw().into_iter().map(|v| v as f32 / 255.0).collect();
        Self {
            data,
            height,
            width,
            channels: IMAGE_CHANNELS,
        }
    }

    pub fn shape(&self) -> (usize, usize, usize) {
        (self.height, self.width, self.channels)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Flatten into the underlying buffer without copying
    pub fn into_flat(self) -> Vec<f32> {
        self.data
    }
}

/// Decode `path`, resize to `height` x `width` and scale to `[0, 1]`
pub fn load_image_tensor(path: &Path, height: usize, width: usize) -> Result<ImageTensor> {
    let image = ImageReader::open(path)
        .map_err(|e| PneumoniaError::Decode(path.to_path_buf(), e.to_string()))?
        .with_guessed_format()
        .map_err(|e| PneumoniaError::Decode(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| PneumoniaError::Decode(path.to_path_buf(), e.to_string()))?;

    Ok(ImageTensor::from_image(&image, height, width))
}

/// Decode an in-memory encoded image (JPEG, PNG, ...)
pub fn decode_image_bytes(bytes: &[u8], height: usize, width: usize) -> Result<ImageTensor> {
    let image = image::load_from_memory(bytes)
        .map_err(|e| PneumoniaError::Decode(PathBuf::from("<memory>"), e.to_string()))?;
    Ok(ImageTensor::from_image(&image, height, width))
}

/// Tensors loaded for a list of records, in record order
#[derive(Debug, Default)]
pub struct LoadedImages {
    pub tensors: Vec<ImageTensor>,
    pub labels: Vec<ClassLabel>,
    pub paths: Vec<PathBuf>,
    /// Records that could not be decoded
    pub skipped: Vec<PathBuf>,
}

impl LoadedImages {
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

/// Load every record one file at a time, skipping undecodable images
pub fn load_image_tensors(records: &[ImageRecord], height: usize, width: usize) -> LoadedImages {
    let pb = ProgressBar::new(records.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let mut loaded = LoadedImages::default();
    for record in records {
        match load_image_tensor(&record.path, height, width) {
            Ok(tensor) => {
                loaded.tensors.push(tensor);
                loaded.labels.push(record.label);
                loaded.paths.push(record.path.clone());
            }
            Err(e) => {
                warn!("Skipping {:?}: {}", record.path, e);
                loaded.skipped.push(record.path.clone());
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(
        "Loaded {} images ({}), skipped {}",
        loaded.len(),
        loaded.class_counts(),
        loaded.skipped.len()
    );
    loaded
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_shape_and_range_for_any_aspect_ratio() {
        let dir = tempfile::tempdir().unwrap();
        for (name, w, h) in [("wide.png", 300, 120), ("tall.jpeg", 50, 410), ("tiny.png", 3, 3)] {
            let path = dir.path().join(name);
            RgbImage::from_fn(w, h, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 255]))
                .save(&path)
                .unwrap();

            let tensor = load_image_tensor(&path, 224, 224).unwrap();
            assert_eq!(tensor.shape(), (224, 224, 3));
            assert_eq!(tensor.as_slice().len(), 224 * 224 * 3);
            assert!(tensor.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_grayscale_is_expanded_to_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gray.png");
        image::GrayImage::from_pixel(10, 10, image::Luma([255])).save(&path).unwrap();

        let tensor = load_image_tensor(&path, 4, 4).unwrap();
        assert_eq!(tensor.shape(), (4, 4, 3));
        assert!(tensor.as_slice().iter().all(|&v| (v - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_invalid_file_is_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpeg");
        std::fs::write(&path, b"garbage").unwrap();
        assert!(matches!(
            load_image_tensor(&path, 8, 8),
            Err(PneumoniaError::Decode(..))
        ));
        assert!(matches!(
            load_image_tensor(&dir.path().join("missing.png"), 8, 8),
            Err(PneumoniaError::Decode(..))
        ));
    }

    #[test]
    fn test_load_many_skips_broken() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.png");
        RgbImage::new(5, 5).save(&good).unwrap();
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"nope").unwrap();

        let records = vec![
            ImageRecord::new(&good, ClassLabel::Normal),
            ImageRecord::new(&bad, ClassLabel::Pneumonia),
        ];
        let loaded = load_image_tensors(&records, 6, 6);
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.labels, vec![ClassLabel::Normal]);
        assert_eq!(loaded.skipped, vec![bad]);
    }

    #[test]
    fn test_from_flat_checks_length() {
        assert!(ImageTensor::from_flat(vec![0.0; 12], 2, 2, 3).is_ok());
        assert!(ImageTensor::from_flat(vec![0.0; 11], 2, 2, 3).is_err());
    }
}
