//! ResNet feature extractor
//!
//! Standard ResNet-18/34 without the classification top. Field names follow
//! the torchvision layout (`conv1`, `bn1`, `layer1..layer4`, `downsample`) so
//! ImageNet weights exported from torchvision map onto this module with a
//! single key remap for the downsample branch.

use burn::{
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    tensor::{backend::Backend, Tensor},
};
use serde::{Deserialize, Serialize};

/// Supported backbone depths
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackboneArch {
    #[value(name = "resnet18")]
    ResNet18,
    #[value(name = "resnet34")]
    ResNet34,
}

impl BackboneArch {
    /// Residual blocks per stage
    pub fn blocks(&self) -> [usize; 4] {
        match self {
            BackboneArch::ResNet18 => [2, 2, 2, 2],
            BackboneArch::ResNet34 => [3, 4, 6, 3],
        }
    }

    /// Channels of the final feature map
    pub fn feature_dim(&self) -> usize {
        512
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackboneArch::ResNet18 => "resnet18",
            BackboneArch::ResNet34 => "resnet34",
        }
    }
}

impl std::fmt::Display for BackboneArch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

fn conv3x3<B: Backend>(in_ch: usize, out_ch: usize, stride: usize, device: &B::Device) -> Conv2d<B> {
    Conv2dConfig::new([in_ch, out_ch], [3, 3])
        .with_stride([stride, stride])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(false)
        .init(device)
}

/// 1x1 projection used when a block changes resolution or width
#[derive(Module, Debug)]
pub struct Downsample<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
}

impl<B: Backend> Downsample<B> {
    pub fn new(in_ch: usize, out_ch: usize, stride: usize, device: &B::Device) -> Self {
        Self {
            conv: Conv2dConfig::new([in_ch, out_ch], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device),
            bn: BatchNormConfig::new(out_ch).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        self.bn.forward(self.conv.forward(x))
    }
}

/// Two 3x3 convolutions with an identity (or projected) shortcut
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub conv2: Conv2d<B>,
    pub bn2: BatchNorm<B, 2>,
    pub downsample: Option<Downsample<B>>,
    pub relu: Relu,
}

impl<B: Backend> BasicBlock<B> {
    pub fn new(in_ch: usize, out_ch: usize, stride: usize, device: &B::Device) -> Self {
        let downsample = if stride != 1 || in_ch != out_ch {
            Some(Downsample::new(in_ch, out_ch, stride, device))
        } else {
            None
        };

        Self {
            conv1: conv3x3(in_ch, out_ch, stride, device),
            bn1: BatchNormConfig::new(out_ch).init(device),
            conv2: conv3x3(out_ch, out_ch, 1, device),
            bn2: BatchNormConfig::new(out_ch).init(device),
            downsample,
            relu: Relu::new(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let identity = match &self.downsample {
            Some(downsample) => downsample.forward(x.clone()),
            None => x.clone(),
        };

        let out = self.relu.forward(self.bn1.forward(self.conv1.forward(x)));
        let out = self.bn2.forward(self.conv2.forward(out));
        self.relu.forward(out + identity)
    }
}

/// ResNet stem and four residual stages, without pooling or a classifier
#[derive(Module, Debug)]
pub struct ResNetBackbone<B: Backend> {
    pub conv1: Conv2d<B>,
    pub bn1: BatchNorm<B, 2>,
    pub relu: Relu,
    pub maxpool: MaxPool2d,
    pub layer1: Vec<BasicBlock<B>>,
    pub layer2: Vec<BasicBlock<B>>,
    pub layer3: Vec<BasicBlock<B>>,
    pub layer4: Vec<BasicBlock<B>>,
}

impl<B: Backend> ResNetBackbone<B> {
    pub fn new(arch: BackboneArch, device: &B::Device) -> Self {
        let [n1, n2, n3, n4] = arch.blocks();

        let conv1 = Conv2dConfig::new([3, 64], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        Self {
            conv1,
            bn1: BatchNormConfig::new(64).init(device),
            relu: Relu::new(),
            maxpool,
            layer1: make_stage(64, 64, n1, 1, device),
            layer2: make_stage(64, 128, n2, 2, device),
            layer3: make_stage(128, 256, n3, 2, device),
            layer4: make_stage(256, 512, n4, 2, device),
        }
    }

    /// `[N, 3, H, W]` -> `[N, 512, H/32, W/32]`
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(input);
        let x = self.relu.forward(self.bn1.forward(x));
        let mut x = self.maxpool.forward(x);

        for block in self
            .layer1
            .iter()
            .chain(&self.layer2)
            .chain(&self.layer3)
            .chain(&self.layer4)
        {
            x = block.forward(x);
        }
        x
    }
}

fn make_stage<B: Backend>(
    in_ch: usize,
    out_ch: usize,
    blocks: usize,
    stride: usize,
    device: &B::Device,
) -> Vec<BasicBlock<B>> {
    (0..blocks)
        .map(|i| {
            if i == 0 {
                BasicBlock::new(in_ch, out_ch, stride, device)
            } else {
                BasicBlock::new(out_ch, out_ch, 1, device)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DefaultBackend;

    type TestBackend = DefaultBackend;

    #[test]
    fn test_block_counts() {
        assert_eq!(BackboneArch::ResNet18.blocks().iter().sum::<usize>(), 8);
        assert_eq!(BackboneArch::ResNet34.blocks().iter().sum::<usize>(), 16);
    }

    #[test]
    fn test_feature_map_shape() {
        let device = Default::default();
        let backbone = ResNetBackbone::<TestBackend>::new(BackboneArch::ResNet18, &device);

        let input = Tensor::<TestBackend, 4>::zeros([1, 3, 64, 64], &device);
        let features = backbone.forward(input);
        assert_eq!(features.dims(), [1, 512, 2, 2]);
    }

    #[test]
    fn test_first_block_of_later_stages_downsamples() {
        let device = Default::default();
        let backbone = ResNetBackbone::<TestBackend>::new(BackboneArch::ResNet18, &device);
        assert!(backbone.layer1[0].downsample.is_none());
        assert!(backbone.layer2[0].downsample.is_some());
        assert!(backbone.layer2[1].downsample.is_none());
    }

    #[test]
    fn test_arch_serde_names() {
        let json = serde_json::to_string(&BackboneArch::ResNet34).unwrap();
        assert_eq!(json, "\"resnet34\"");
        assert_eq!(BackboneArch::ResNet18.to_string(), "resnet18");
    }
}
