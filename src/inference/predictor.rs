//! Single-image prediction with a loaded model
//!
//! Burn modules are `Send` but not `Sync`, so the model sits behind a mutex
//! and a `Predictor` can be shared between request handlers.

use std::path::Path;
use std::sync::Mutex;

use base64::Engine;
use burn::tensor::{backend::Backend, Tensor, TensorData};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::DefaultBackend;
use crate::dataset::preprocess::{decode_image_bytes, load_image_tensor, ImageTensor};
use crate::dataset::ClassLabel;
use crate::model::bundle::{load_bundle, BundleManifest};
use crate::model::{PneumoniaClassifier, PneumoniaClassifierConfig};
use crate::utils::error::{PneumoniaError, Result, ResultExt};
use crate::DECISION_THRESHOLD;

/// Result of a single prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub label: ClassLabel,
    /// P(PNEUMONIA)
    pub probability: f32,
}

/// Predictor for running inference with a trained model
pub struct Predictor<B: Backend = DefaultBackend> {
    model: Mutex<PneumoniaClassifier<B>>,
    config: PneumoniaClassifierConfig,
    manifest: Option<BundleManifest>,
    device: B::Device,
    threshold: f32,
}

impl<B: Backend> Predictor<B> {
    /// Wrap an in-memory model
    pub fn from_model(
        model: PneumoniaClassifier<B>,
        config: PneumoniaClassifierConfig,
        device: B::Device,
    ) -> Self {
        Self {
            model: Mutex::new(model),
            config,
            manifest: None,
            device,
            threshold: DECISION_THRESHOLD,
        }
    }

    /// Load a model bundle written by training
    pub fn from_bundle(path: &Path, device: B::Device) -> Result<Self> {
        let (model, manifest) = load_bundle::<B>(path, &device)?;
        Ok(Self {
            model: Mutex::new(model),
            config: manifest.model.clone(),
            manifest: Some(manifest),
            device,
            threshold: DECISION_THRESHOLD,
        })
    }

    /// Override the PNEUMONIA decision threshold
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn config(&self) -> &PneumoniaClassifierConfig {
        &self.config
    }

    /// Bundle manifest, when loaded from a bundle
    pub fn manifest(&self) -> Option<&BundleManifest> {
        self.manifest.as_ref()
    }

    pub fn image_size(&self) -> usize {
        self.config.image_size
    }

    /// Classify an already normalized image tensor
    pub fn predict_tensor(&self, image: ImageTensor) -> Result<Prediction> {
        let size = self.image_size();
        let (height, width, channels) = image.shape();
        if (height, width, channels) != (size, size, self.config.in_channels) {
            return Err(PneumoniaError::InvalidInput(format!(
                "expected a {}x{}x{} image, got {}x{}x{}",
                size, size, self.config.in_channels, height, width, channels
            )));
        }

        let input = Tensor::<B, 4>::from_floats(
            TensorData::new(image.into_flat(), [1, height, width, channels]),
            &self.device,
        )
        .permute([0, 3, 1, 2]);

        let output = {
            let model = self
                .model
                .lock()
                .map_err(|_| PneumoniaError::Inference("model lock poisoned".to_string()))?;
            model.forward_probability(input)
        };

        let probability = output
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| PneumoniaError::Inference(format!("{:?}", e)))?
            .first()
            .copied()
            .context("model returned no output")?;

        let prediction = Prediction {
            label: ClassLabel::from_probability(probability, self.threshold),
            probability,
        };
        debug!("Predicted {} (p = {:.4})", prediction.label, probability);
        Ok(prediction)
    }

    /// Classify an encoded image (JPEG, PNG, ...)
    pub fn predict_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        let size = self.image_size();
        self.predict_tensor(decode_image_bytes(bytes, size, size)?)
    }

    /// Classify a base64-encoded image, optionally given as a `data:` URL
    ///
    /// ASCII whitespace inside the payload is ignored, so line-wrapped
    /// encoder output is accepted.
    pub fn predict_base64(&self, encoded: &str) -> Result<Prediction> {
        let payload = match encoded.find("base64,") {
            Some(pos) if encoded.starts_with("data:") => &encoded[pos + "base64,".len()..],
            _ => encoded,
        };
        let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(compact)
            .with_context(|| "image is not valid base64".to_string())?;
        self.predict_bytes(&bytes)
    }

    /// Classify an image file
    pub fn predict_path(&self, path: &Path) -> Result<Prediction> {
        let size = self.image_size();
        self.predict_tensor(load_image_tensor(path, size, size)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    type TestBackend = NdArray;

    fn predictor() -> Predictor<TestBackend> {
        let device = Default::default();
        let config = PneumoniaClassifierConfig::new().with_image_size(64).with_hidden_size(8);
        let model = config.init::<TestBackend>(&device).unwrap();
        Predictor::from_model(model, config, device)
    }

    fn jpeg_bytes() -> Vec<u8> {
        let img = RgbImage::from_fn(80, 100, |x, y| Rgb([(x * 3) as u8, (y * 2) as u8, 128]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Jpeg)
            .unwrap();
        bytes
    }

    #[test]
    fn test_predict_bytes() {
        let prediction = predictor().predict_bytes(&jpeg_bytes()).unwrap();
        assert!((0.0..=1.0).contains(&prediction.probability));
        assert_eq!(
            prediction.label,
            ClassLabel::from_probability(prediction.probability, DECISION_THRESHOLD)
        );
    }

    #[test]
    fn test_predict_base64_and_data_url_agree() {
        let predictor = predictor();
        let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg_bytes());
        let plain = predictor.predict_base64(&encoded).unwrap();
        let url = predictor
            .predict_base64(&format!("data:image/jpeg;base64,{}", encoded))
            .unwrap();
        assert_eq!(plain, url);
    }

    #[test]
    fn test_predict_base64_line_wrapped() {
        let predictor = predictor();
        let encoded = base64::engine::general_purpose::STANDARD.encode(jpeg_bytes());
        let wrapped = encoded
            .as_bytes()
            .chunks(76)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect::<Vec<_>>()
            .join("\r\n");
        assert!(wrapped.contains('\n'));

        let plain = predictor.predict_base64(&encoded).unwrap();
        let from_wrapped = predictor.predict_base64(&format!("  {}\n", wrapped)).unwrap();
        assert_eq!(plain, from_wrapped);
    }

    #[test]
    fn test_invalid_inputs() {
        let predictor = predictor();
        assert!(matches!(
            predictor.predict_base64("%%% not base64 %%%"),
            Err(PneumoniaError::InvalidInput(_))
        ));
        let garbage = base64::engine::general_purpose::STANDARD.encode(b"definitely not an image");
        assert!(matches!(
            predictor.predict_base64(&garbage),
            Err(PneumoniaError::Decode(..))
        ));
        let wrong_shape = ImageTensor::from_flat(vec![0.0; 12], 2, 2, 3).unwrap();
        assert!(predictor.predict_tensor(wrong_shape).is_err());
    }

    #[test]
    fn test_threshold_override() {
        let predictor = predictor().with_threshold(0.0);
        let prediction = predictor.predict_bytes(&jpeg_bytes()).unwrap();
        assert_eq!(prediction.label, ClassLabel::Pneumonia);
    }
}
