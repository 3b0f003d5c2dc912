//! CNN Model Architecture for Pneumonia Classification
//!
//! Four valid-padding convolution blocks (ReLU + 2x2 max pooling) followed by
//! a dense head with a single output logit. `sigmoid(logit)` is the
//! probability of PNEUMONIA.
//!
//! ```text
//! input  [N, 3, 224, 224]
//! conv1  3 -> 64,   3x3  -> 222 -> pool 111
//! conv2  64 -> 64,  2x2  -> 110 -> pool 55
//! conv3  64 -> 128, 3x3  -> 53  -> pool 26
//! conv4  128 -> 256, 3x3 -> 24  -> pool 12
//! flatten 256 * 12 * 12 -> dense 512 -> dropout -> dense 1
//! ```

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig, Relu,
    },
    tensor::{activation::sigmoid, backend::Backend, Tensor},
};

use crate::utils::error::{self, PneumoniaError};
use crate::{IMAGE_CHANNELS, IMAGE_SIZE};

/// `(out_channels, kernel_size)` of each convolution block
const CONV_LAYERS: [(usize, usize); 4] = [(64, 3), (64, 2), (128, 3), (256, 3)];

/// Configuration for the PneumoniaClassifier CNN model
#[derive(Config, Debug)]
pub struct PneumoniaClassifierConfig {
    /// Input image size (square images)
    #[config(default = "IMAGE_SIZE")]
    pub image_size: usize,

    /// Number of input channels (3 for RGB)
    #[config(default = "IMAGE_CHANNELS")]
    pub in_channels: usize,

    /// Width of the hidden dense layer
    #[config(default = "512")]
    pub hidden_size: usize,

    /// Dropout rate before the output layer
    #[config(default = "0.5")]
    pub dropout: f64,
}

impl PneumoniaClassifierConfig {
    /// Spatial side length after the last pooling layer
    pub fn final_feature_map(&self) -> error::Result<usize> {
        let mut size = self.image_size;
        for (index, (_, kernel)) in CONV_LAYERS.iter().enumerate() {
            if size < *kernel {
                return Err(PneumoniaError::Config(format!(
                    "image_size {} is too small: block {} receives {}x{} input for a {}x{} kernel",
                    self.image_size,
                    index + 1,
                    size,
                    size,
                    kernel,
                    kernel
                )));
            }
            size = (size - kernel + 1) / 2;
            if size == 0 {
                return Err(PneumoniaError::Config(format!(
                    "image_size {} is too small: block {} pools down to nothing",
                    self.image_size,
                    index + 1
                )));
            }
        }
        Ok(size)
    }

    /// Number of features entering the dense head
    pub fn flattened_size(&self) -> error::Result<usize> {
        let side = self.final_feature_map()?;
        let channels = CONV_LAYERS[CONV_LAYERS.len() - 1].0;
        Ok(channels * side * side)
    }

    /// Validate the configuration
    pub fn validate(&self) -> error::Result<()> {
        if self.in_channels == 0 || self.hidden_size == 0 {
            return Err(PneumoniaError::Config(
                "in_channels and hidden_size must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(PneumoniaError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        self.final_feature_map().map(|_| ())
    }

    /// Initialize a model with fresh weights
    pub fn init<B: Backend>(&self, device: &B::Device) -> error::Result<PneumoniaClassifier<B>> {
        self.validate()?;
        PneumoniaClassifier::new(self, device)
    }
}

/// Convolution, ReLU and 2x2 max pooling
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [kernel_size, kernel_size]).init(device);

        Self {
            conv,
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Binary chest X-ray classifier
#[derive(Module, Debug)]
pub struct PneumoniaClassifier<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,
    pub conv4: ConvBlock<B>,

    pub fc1: Linear<B>,
    pub relu: Relu,
    pub dropout: Dropout,
    pub fc2: Linear<B>,
}

impl<B: Backend> PneumoniaClassifier<B> {
    /// Create a new model from configuration
    pub fn new(config: &PneumoniaClassifierConfig, device: &B::Device) -> error::Result<Self> {
        let flattened = config.flattened_size()?;
        let [(c1, k1), (c2, k2), (c3, k3), (c4, k4)] = CONV_LAYERS;

        Ok(Self {
            conv1: ConvBlock::new(config.in_channels, c1, k1, device),
            conv2: ConvBlock::new(c1, c2, k2, device),
            conv3: ConvBlock::new(c2, c3, k3, device),
            conv4: ConvBlock::new(c3, c4, k4, device),
            fc1: LinearConfig::new(flattened, config.hidden_size).init(device),
            relu: Relu::new(),
            dropout: DropoutConfig::new(config.dropout).init(),
            fc2: LinearConfig::new(config.hidden_size, 1).init(device),
        })
    }

    /// Raw logits with shape `[batch_size, 1]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = self.conv1.forward(images);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);
        let x = self.conv4.forward(x);

        let [batch_size, channels, height, width] = x.dims();
        let x = x.reshape([batch_size, channels * height * width]);

        let x = self.fc1.forward(x);
        let x = self.relu.forward(x);
        let x = self.dropout.forward(x);
        self.fc2.forward(x)
    }

    /// P(PNEUMONIA) per image, shape `[batch_size, 1]`
    pub fn forward_probability(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        sigmoid(self.forward(images))
    }
}
