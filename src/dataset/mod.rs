//! Dataset handling: folder discovery, seeded split, preprocessing,
//! augmentation, and the Burn dataset/batcher pair used by training.

pub mod augmentation;
pub mod burn_dataset;
pub mod loader;
pub mod preprocess;
pub mod split;

pub use augmentation::{AugmentationConfig, Augmenter};
pub use burn_dataset::{WasteBatch, WasteBatcher, WasteImageDataset, WasteItem};
pub use loader::{DatasetStats, ImageSample, WasteDataset};
pub use split::{DatasetSplits, SplitConfig};
