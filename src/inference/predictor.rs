//! Single-image prediction
//!
//! A [`Predictor`] owns a loaded classifier together with its artifact
//! metadata, so input size and label list always come from the same place
//! the weights did.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use burn::tensor::backend::Backend;
use colored::Colorize;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::dataset::preprocess;
use crate::model::{load_artifact, ArtifactMetadata, WasteClassifier};
use crate::utils::{Result, WasteSortError};

/// Number of ranked classes kept in a [`PredictionResult`]
pub const DEFAULT_TOP_K: usize = 3;

/// Result of a single prediction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Input image, when the prediction came from a file
    pub image_path: Option<PathBuf>,
    /// Argmax index into the artifact's class list
    pub class_index: usize,
    pub label: String,
    /// Softmax probability of the predicted class
    pub confidence: f32,
    pub probabilities: Vec<f32>,
    /// Highest-probability classes, best first
    pub top_k: Vec<(usize, String, f32)>,
    pub inference_time_ms: f64,
}

impl PredictionResult {
    /// Build a result from a probability vector aligned with `class_names`
    pub fn new(
        probabilities: Vec<f32>,
        class_names: &[String],
        inference_time: Duration,
        image_path: Option<PathBuf>,
    ) -> Result<Self> {
        if probabilities.len() != class_names.len() {
            return Err(WasteSortError::Inference(format!(
                "Model returned {} scores for {} classes",
                probabilities.len(),
                class_names.len()
            )));
        }

        let mut ranked: Vec<(usize, f32)> = probabilities.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        let (class_index, confidence) = ranked
            .first()
            .copied()
            .ok_or_else(|| WasteSortError::Inference("Empty prediction vector".to_string()))?;

        let top_k = ranked
            .iter()
            .take(DEFAULT_TOP_K)
            .map(|&(idx, p)| (idx, class_names[idx].clone(), p))
            .collect();

        Ok(Self {
            image_path,
            class_index,
            label: class_names[class_index].clone(),
            confidence,
            probabilities,
            top_k,
            inference_time_ms: inference_time.as_secs_f64() * 1000.0,
        })
    }

    /// Print the prediction with its runner-up classes
    pub fn display(&self) {
        if let Some(path) = &self.image_path {
            println!("{} {}", "Image:".cyan(), path.display());
        }
        println!(
            "{} {} ({:.1}%)",
            "Prediction:".green().bold(),
            self.label.bold(),
            self.confidence * 100.0
        );
        for (rank, (_, name, p)) in self.top_k.iter().enumerate() {
            println!("  {}. {:<20} {:>6.2}%", rank + 1, name, p * 100.0);
        }
        println!("  Inference time: {:.1} ms", self.inference_time_ms);
    }
}

/// Loaded classifier plus the metadata it was trained with
pub struct Predictor<B: Backend> {
    model: WasteClassifier<B>,
    metadata: ArtifactMetadata,
    device: B::Device,
}

impl<B: Backend> Predictor<B> {
    /// Load an artifact written by training
    pub fn load(model_path: impl AsRef<Path>, device: &B::Device) -> Result<Self> {
        let (model, metadata) = load_artifact::<B>(model_path, device)?;
        Self::new(model, metadata, device.clone())
    }

    pub fn new(model: WasteClassifier<B>, metadata: ArtifactMetadata, device: B::Device) -> Result<Self> {
        metadata.validate()?;
        if model.num_classes() != metadata.num_classes() {
            return Err(WasteSortError::Model(format!(
                "Model has {} outputs but metadata lists {} classes",
                model.num_classes(),
                metadata.num_classes()
            )));
        }
        Ok(Self {
            model,
            metadata,
            device,
        })
    }

    /// Declared square input size
    pub fn image_size(&self) -> usize {
        self.metadata.image_size
    }

    pub fn class_names(&self) -> &[String] {
        &self.metadata.class_names
    }

    pub fn metadata(&self) -> &ArtifactMetadata {
        &self.metadata
    }

    /// Resize, rescale, run one forward pass and take the argmax
    pub fn predict_image(&self, image: &RgbImage) -> Result<PredictionResult> {
        let start = Instant::now();

        let input = preprocess::prepare_single::<B>(image, self.image_size(), &self.device);
        let probabilities = self
            .model
            .forward_softmax(input)
            .into_data()
            .to_vec::<f32>()
            .map_err(|e| WasteSortError::Inference(format!("Failed to read model output: {:?}", e)))?;

        let result = PredictionResult::new(
            probabilities,
            self.class_names(),
            start.elapsed(),
            None,
        )?;
        debug!(
            "Predicted '{}' ({:.3}) in {:.1} ms",
            result.label, result.confidence, result.inference_time_ms
        );
        Ok(result)
    }

    /// Decode an image file and predict it
    pub fn predict_path(&self, path: &Path) -> Result<PredictionResult> {
        let image = preprocess::load_rgb(path)?;
        let mut result = self.predict_image(&image)?;
        result.image_path = Some(path.to_path_buf());
        Ok(result)
    }
}
