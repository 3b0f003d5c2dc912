//! Burn Dataset Integration
//!
//! Implements Burn's `Dataset` trait and `Batcher` for chest X-ray items. The
//! balanced training set lives in memory; validation and test sets are
//! loaded from disk one item at a time.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use tracing::warn;

use super::balance::BalancedSet;
use super::loader::{ClassCounts, ImageRecord};
use super::preprocess::load_image_tensor;
use super::ClassLabel;
use crate::IMAGE_CHANNELS;

/// A single normalized image with its label
#[derive(Clone, Debug)]
pub struct XrayItem {
    /// Row-major HWC values in `[0, 1]`
    pub image: Vec<f32>,
    pub label: ClassLabel,
}

#[derive(Debug, Clone)]
enum Source {
    InMemory(Vec<XrayItem>),
    Lazy {
        records: Vec<ImageRecord>,
        image_size: usize,
    },
}

/// X-ray dataset implementing Burn's Dataset trait
#[derive(Debug, Clone)]
pub struct XrayDataset {
    source: Source,
}

impl XrayDataset {
    /// Take ownership of a balanced training set
    pub fn from_balanced(balanced: BalancedSet) -> Self {
        let items = balanced
            .tensors
            .into_iter()
            .zip(balanced.labels)
            .map(|(tensor, label)| XrayItem {
                image: tensor.into_flat(),
                label,
            })
            .collect();
        Self {
            source: Source::InMemory(items),
        }
    }

    /// Load `records` on demand at `image_size` x `image_size`
    pub fn from_records(records: Vec<ImageRecord>, image_size: usize) -> Self {
        Self {
            source: Source::Lazy {
                records,
                image_size,
            },
        }
    }

    /// Labels in index order, without decoding any image
    pub fn labels(&self) -> Vec<ClassLabel> {
        match &self.source {
            Source::InMemory(items) => items.iter().map(|item| item.label).collect(),
            Source::Lazy { records, .. } => records.iter().map(|r| r.label).collect(),
        }
    }

    pub fn class_counts(&self) -> ClassCounts {
        ClassCounts::from_labels(&self.labels())
    }
}

impl Dataset<XrayItem> for XrayDataset {
    fn get(&self, index: usize) -> Option<XrayItem> {
        match &self.source {
            Source::InMemory(items) => items.get(index).cloned(),
            Source::Lazy {
                records,
                image_size,
            } => {
                let record = records.get(index)?;
                match load_image_tensor(&record.path, *image_size, *image_size) {
                    Ok(tensor) => Some(XrayItem {
                        image: tensor.into_flat(),
                        label: record.label,
                    }),
                    Err(e) => {
                        warn!("Skipping {:?}: {}", record.path, e);
                        None
                    }
                }
            }
        }
    }

    fn len(&self) -> usize {
        match &self.source {
            Source::InMemory(items) => items.len(),
            Source::Lazy { records, .. } => records.len(),
        }
    }
}

/// A batch of X-rays
#[derive(Clone, Debug)]
pub struct XrayBatch<B: Backend> {
    /// Shape `[batch_size, 3, height, width]`
    pub images: Tensor<B, 4>,
    /// Binary targets (1.0 = PNEUMONIA), shape `[batch_size, 1]`
    pub targets: Tensor<B, 2>,
    pub labels: Vec<ClassLabel>,
}

/// Batcher stacking HWC items into an NCHW tensor
#[derive(Clone, Debug)]
pub struct XrayBatcher {
    image_size: usize,
}

impl XrayBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }
}

impl<B: Backend> Batcher<B, XrayItem, XrayBatch<B>> for XrayBatcher {
    fn batch(&self, items: Vec<XrayItem>, device: &B::Device) -> XrayBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let labels: Vec<ClassLabel> = items.iter().map(|item| item.label).collect();
        let images_data: Vec<f32> = items.into_iter().flat_map(|item| item.image).collect();

        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, size, size, IMAGE_CHANNELS]),
            device,
        )
        .permute([0, 3, 1, 2]);

        let targets_data: Vec<f32> = labels.iter().map(|label| label.target()).collect();
        let targets = Tensor::<B, 2>::from_floats(TensorData::new(targets_data, [batch_size, 1]), device);

        XrayBatch {
            images,
            targets,
            labels,
        }
    }
}
