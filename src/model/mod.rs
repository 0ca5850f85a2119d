//! Model definitions
//!
//! - `backbone`: ResNet-18/34 feature extractor with torchvision-compatible names
//! - `classifier`: backbone + global pooling, dropout and linear head
//! - `weights`: pretrained backbone loading
//! - `artifact`: saving/loading a trained model with its label metadata

pub mod artifact;
pub mod backbone;
pub mod classifier;
pub mod weights;

use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};

pub use artifact::{load_artifact, load_metadata, save_artifact, ArtifactMetadata, ArtifactPaths};
pub use backbone::{BackboneArch, ResNetBackbone};
pub use classifier::{WasteClassifier, WasteClassifierConfig};
pub use weights::{load_backbone_weights, save_backbone};

/// Recorder for every weights file the crate writes (`.mpk`, full precision)
pub type WeightsRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;
