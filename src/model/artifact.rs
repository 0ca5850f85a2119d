//! Model artifact: weights record plus a JSON metadata sidecar
//!
//! A trained model is stored as two files sharing a stem:
//!
//! ```text
//! classifier.mpk   # Burn record of WasteClassifier
//! classifier.json  # ArtifactMetadata (labels, input size, architecture)
//! ```
//!
//! The label list lives only in the metadata, so every consumer maps output
//! indices through the exact list the model was trained with.

use std::path::{Path, PathBuf};

use burn::module::Module;
use burn::tensor::backend::Backend;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::backbone::BackboneArch;
use super::classifier::{WasteClassifier, WasteClassifierConfig};
use super::WeightsRecorder;
use crate::utils::{Result, WasteSortError};

/// Bumped whenever the metadata layout changes incompatibly
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// Everything a predictor needs besides the weights
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub format_version: u32,
    /// Class names, index-aligned with the classifier output
    pub class_names: Vec<String>,
    /// Square input size the model was trained on
    pub image_size: usize,
    pub backbone: BackboneArch,
    pub dropout: f64,
    pub normalize_input: bool,
    pub created_at: DateTime<Utc>,
    /// 1-based epoch whose weights were kept
    #[serde(default)]
    pub best_epoch: Option<usize>,
    #[serde(default)]
    pub best_val_loss: Option<f64>,
    pub crate_version: String,
}

impl ArtifactMetadata {
    pub fn new(class_names: Vec<String>, image_size: usize, config: &WasteClassifierConfig) -> Self {
        Self {
            format_version: ARTIFACT_FORMAT_VERSION,
            class_names,
            image_size,
            backbone: config.backbone,
            dropout: config.dropout,
            normalize_input: config.normalize_input,
            created_at: Utc::now(),
            best_epoch: None,
            best_val_loss: None,
            crate_version: crate::VERSION.to_string(),
        }
    }

    pub fn num_classes(&self) -> usize {
        self.class_names.len()
    }

    /// Rebuild the model configuration this artifact was saved with
    pub fn classifier_config(&self) -> WasteClassifierConfig {
        WasteClassifierConfig::new(self.num_classes())
            .with_backbone(self.backbone)
            .with_dropout(self.dropout)
            .with_normalize_input(self.normalize_input)
    }

    pub fn validate(&self) -> Result<()> {
        if self.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(WasteSortError::Model(format!(
                "Unsupported artifact format version {} (expected {})",
                self.format_version, ARTIFACT_FORMAT_VERSION
            )));
        }
        if self.class_names.is_empty() {
            return Err(WasteSortError::Model(
                "Artifact metadata lists no class names".to_string(),
            ));
        }
        if self.image_size == 0 {
            return Err(WasteSortError::Model(
                "Artifact metadata has an image size of 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// On-disk locations derived from the model path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub weights: PathBuf,
    pub metadata: PathBuf,
    pub history: PathBuf,
}

impl ArtifactPaths {
    /// `classifier.mpk` or `classifier` both resolve to the same artifact
    pub fn from_model_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            weights: path.with_extension("mpk"),
            metadata: path.with_extension("json"),
            history: path.with_extension("history.json"),
        }
    }
}

/// Persist weights and metadata
pub fn save_artifact<B: Backend>(
    model: WasteClassifier<B>,
    metadata: &ArtifactMetadata,
    model_path: impl AsRef<Path>,
) -> Result<ArtifactPaths> {
    metadata.validate()?;
    if model.num_classes() != metadata.num_classes() {
        return Err(WasteSortError::Model(format!(
            "Model has {} outputs but metadata lists {} classes",
            model.num_classes(),
            metadata.num_classes()
        )));
    }

    let paths = ArtifactPaths::from_model_path(model_path);
    if let Some(parent) = paths.weights.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    model
        .save_file(paths.weights.clone(), &WeightsRecorder::new())
        .map_err(|e| WasteSortError::Model(format!("Failed to save model: {:?}", e)))?;

    let json = serde_json::to_string_pretty(metadata)?;
    std::fs::write(&paths.metadata, json)?;

    info!(
        "Saved model to {} (metadata: {})",
        paths.weights.display(),
        paths.metadata.display()
    );
    Ok(paths)
}

/// Read and validate only the metadata sidecar
pub fn load_metadata(model_path: impl AsRef<Path>) -> Result<ArtifactMetadata> {
    let paths = ArtifactPaths::from_model_path(model_path);
    if !paths.metadata.exists() {
        return Err(WasteSortError::Model(format!(
            "Metadata file {} not found; the class list cannot be recovered without it",
            paths.metadata.display()
        )));
    }

    let content = std::fs::read_to_string(&paths.metadata)?;
    let metadata: ArtifactMetadata = serde_json::from_str(&content)?;
    metadata.validate()?;
    Ok(metadata)
}

/// Load a model and its metadata
pub fn load_artifact<B: Backend>(
    model_path: impl AsRef<Path>,
    device: &B::Device,
) -> Result<(WasteClassifier<B>, ArtifactMetadata)> {
    let paths = ArtifactPaths::from_model_path(model_path.as_ref());
    if !paths.weights.exists() {
        return Err(WasteSortError::PathNotFound(paths.weights));
    }

    let metadata = load_metadata(model_path)?;
    debug!(
        "Artifact: {} classes, {}px input, {}",
        metadata.num_classes(),
        metadata.image_size,
        metadata.backbone
    );

    let model = WasteClassifier::<B>::new(&metadata.classifier_config(), device)
        .load_file(paths.weights.clone(), &WeightsRecorder::new(), device)
        .map_err(|e| WasteSortError::Model(format!("Failed to load model: {:?}", e)))?;

    let [_, outputs] = model.head.weight.dims();
    if outputs != metadata.num_classes() {
        return Err(WasteSortError::Model(format!(
            "Weights produce {} classes but metadata lists {}",
            outputs,
            metadata.num_classes()
        )));
    }

    Ok((model, metadata))
}
