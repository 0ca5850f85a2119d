//! Transfer-learning classifier: ResNet backbone + pooling/dropout/linear head

use burn::{
    config::Config,
    module::Module,
    nn::{
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
        Dropout, DropoutConfig, Linear, LinearConfig,
    },
    tensor::{activation::softmax, backend::Backend, Tensor, TensorData},
};

use super::backbone::{BackboneArch, ResNetBackbone};

/// ImageNet channel statistics the pretrained backbone expects
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Configuration for the WasteClassifier model
#[derive(Config, Debug)]
pub struct WasteClassifierConfig {
    /// Number of output classes
    pub num_classes: usize,

    /// Backbone depth
    #[config(default = "BackboneArch::ResNet18")]
    pub backbone: BackboneArch,

    /// Dropout between pooling and the output layer
    #[config(default = "0.3")]
    pub dropout: f64,

    /// Standardize [0, 1] inputs with ImageNet mean/std inside `forward`
    #[config(default = "true")]
    pub normalize_input: bool,
}

/// Waste image classifier
///
/// ```text
/// [N, 3, H, W] in [0, 1]
///   -> (optional ImageNet standardization)
///   -> ResNet backbone      [N, 512, h, w]
///   -> global average pool  [N, 512]
///   -> dropout -> linear    [N, num_classes]
/// ```
#[derive(Module, Debug)]
pub struct WasteClassifier<B: Backend> {
    pub backbone: ResNetBackbone<B>,
    pub global_pool: AdaptiveAvgPool2d,
    pub dropout: Dropout,
    pub head: Linear<B>,
    num_classes: usize,
    normalize_input: bool,
}

impl<B: Backend> WasteClassifier<B> {
    pub fn new(config: &WasteClassifierConfig, device: &B::Device) -> Self {
        Self {
            backbone: ResNetBackbone::new(config.backbone, device),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            dropout: DropoutConfig::new(config.dropout).init(),
            head: LinearConfig::new(config.backbone.feature_dim(), config.num_classes).init(device),
            num_classes: config.num_classes,
            normalize_input: config.normalize_input,
        }
    }

    /// Raw class scores (logits), `[batch, num_classes]`
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        let x = if self.normalize_input {
            standardize(images)
        } else {
            images
        };

        let features = self.backbone.forward(x);
        let pooled = self.global_pool.forward(features);

        let [batch, channels, _, _] = pooled.dims();
        let pooled = pooled.reshape([batch, channels]);

        self.head.forward(self.dropout.forward(pooled))
    }

    /// Class probabilities, `[batch, num_classes]`
    pub fn forward_softmax(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        softmax(self.forward(images), 1)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Replace the backbone, e.g. with one carrying pretrained weights
    pub fn with_backbone(mut self, backbone: ResNetBackbone<B>) -> Self {
        self.backbone = backbone;
        self
    }
}

fn standardize<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 4> {
    let device = images.device();
    let mean = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]), &device);
    let std = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]), &device);
    (images - mean) / std
}
