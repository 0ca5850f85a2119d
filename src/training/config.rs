//! Training configuration
//!
//! Defaults reproduce the reference recipe: 240px inputs, 80/20 split with
//! seed 123, batch 32/64, Adam at 1e-5, 10 epochs, early stopping on
//! validation loss with patience 5. A TOML file can override any subset:
//!
//! ```toml
//! data_dir = "classes"
//! epochs = 20
//!
//! [model]
//! backbone = "resnet34"
//! backbone_weights = "weights/resnet34-imagenet.pth"
//!
//! [augmentation]
//! enabled = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dataset::augmentation::AugmentationConfig;
use crate::dataset::split::SplitConfig;
use crate::model::{BackboneArch, WasteClassifierConfig};
use crate::utils::{load_toml_config, Result, WasteSortError};

/// Model-related training options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    pub backbone: BackboneArch,
    /// Pretrained backbone weights (`.mpk`, or `.pt`/`.pth` with the `pytorch` feature)
    pub backbone_weights: Option<PathBuf>,
    pub dropout: f64,
    /// Apply ImageNet mean/std inside the model
    pub normalize_input: bool,
    /// Train only the head; the backbone keeps its loaded weights
    pub freeze_backbone: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            backbone: BackboneArch::ResNet18,
            backbone_weights: None,
            dropout: 0.3,
            normalize_input: true,
            freeze_backbone: false,
        }
    }
}

/// Early stopping on validation loss
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EarlyStoppingConfig {
    pub enabled: bool,
    /// Epochs without improvement before stopping
    pub patience: usize,
    /// Minimum decrease in validation loss that counts as improvement
    pub min_delta: f64,
    /// Keep the weights from the best epoch instead of the last one
    pub restore_best_weights: bool,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            patience: 5,
            min_delta: 0.0,
            restore_best_weights: true,
        }
    }
}

/// Full training configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Root directory with one subdirectory per class
    pub data_dir: PathBuf,
    /// Where the trained artifact is written (`.mpk` + `.json` sidecar)
    pub model_path: PathBuf,
    /// Square input size in pixels
    pub image_size: usize,
    pub epochs: usize,
    pub learning_rate: f64,
    pub train_batch_size: usize,
    pub val_batch_size: usize,
    /// Fraction of images held out for validation
    pub validation_split: f64,
    /// Seed for the split, epoch shuffling and augmentation
    pub seed: u64,
    /// Use at most this many images (quick runs)
    pub max_samples: Option<usize>,
    pub model: ModelOptions,
    pub early_stopping: EarlyStoppingConfig,
    pub augmentation: AugmentationConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(crate::DEFAULT_DATA_DIR),
            model_path: PathBuf::from(crate::DEFAULT_MODEL_PATH),
            image_size: crate::IMAGE_SIZE,
            epochs: 10,
            learning_rate: 1e-5,
            train_batch_size: 32,
            val_batch_size: 64,
            validation_split: 0.2,
            seed: 123,
            max_samples: None,
            model: ModelOptions::default(),
            early_stopping: EarlyStoppingConfig::default(),
            augmentation: AugmentationConfig::default(),
        }
    }
}

impl TrainingConfig {
    /// Load from a TOML file; missing keys keep their defaults
    pub fn from_toml(path: &Path) -> Result<Self> {
        load_toml_config(path)
    }

    pub fn split_config(&self) -> SplitConfig {
        SplitConfig {
            validation_fraction: self.validation_split,
            seed: self.seed,
            max_samples: self.max_samples,
        }
    }

    pub fn classifier_config(&self, num_classes: usize) -> WasteClassifierConfig {
        WasteClassifierConfig::new(num_classes)
            .with_backbone(self.model.backbone)
            .with_dropout(self.model.dropout)
            .with_normalize_input(self.model.normalize_input)
    }

    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(WasteSortError::Config("epochs must be at least 1".to_string()));
        }
        if self.image_size < 32 {
            return Err(WasteSortError::Config(format!(
                "image_size must be at least 32, got {}",
                self.image_size
            )));
        }
        if self.train_batch_size == 0 || self.val_batch_size == 0 {
            return Err(WasteSortError::Config("batch sizes must be non-zero".to_string()));
        }
        if self.learning_rate.is_nan() || self.learning_rate <= 0.0 {
            return Err(WasteSortError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return Err(WasteSortError::Config(format!(
                "dropout must be in [0, 1), got {}",
                self.model.dropout
            )));
        }
        if self.early_stopping.enabled && self.early_stopping.patience == 0 {
            return Err(WasteSortError::Config(
                "early_stopping.patience must be at least 1".to_string(),
            ));
        }
        self.split_config().validate()?;
        self.augmentation.validate()?;
        Ok(())
    }
}
