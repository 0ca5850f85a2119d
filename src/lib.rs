//! # Waste Sort
//!
//! Waste image classification with the Burn framework: fine-tune a pretrained
//! CNN backbone on a directory of labelled photos, then classify single images
//! or frames from a live camera.
//!
//! ## Modules
//!
//! - `dataset`: class-folder discovery, seeded train/validation split, image
//!   preprocessing and augmentation, Burn dataset/batcher
//! - `model`: ResNet backbone, classification head, artifact save/load
//! - `training`: configuration, early stopping, history and the training loop
//! - `inference`: the artifact-backed predictor and the preview window
//! - `camera`: capture thread, frame mailbox and the browser UI
//! - `backend`: compile-time backend selection (NdArray or CUDA)
//! - `utils`: errors, logging and small helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use waste_sort::backend::{default_device, DefaultBackend, TrainingBackend};
//! use waste_sort::inference::Predictor;
//! use waste_sort::training::{run_training, TrainingConfig};
//!
//! let summary = run_training::<TrainingBackend>(&TrainingConfig::default(), &default_device())?;
//! let predictor = Predictor::<DefaultBackend>::load(&summary.paths.weights, &default_device())?;
//! let result = predictor.predict_path("photo.jpg".as_ref())?;
//! println!("{}", result.label);
//! ```

pub mod backend;
pub mod camera;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{DatasetSplits, SplitConfig, WasteDataset};
pub use inference::{PredictionResult, Predictor};
pub use model::{WasteClassifier, WasteClassifierConfig};
pub use training::{run_training, TrainingConfig, TrainingSummary};
pub use utils::error::{Result, WasteSortError};

/// Square input size the classifier is trained and served at
pub const IMAGE_SIZE: usize = 240;

/// Dataset root with one subdirectory per class
pub const DEFAULT_DATA_DIR: &str = "classes";

/// Where training writes the classifier and where predictors look for it
pub const DEFAULT_MODEL_PATH: &str = "classifier.mpk";

/// File written by the camera UI's Capture button
pub const DEFAULT_CAPTURE_PATH: &str = "capture.jpg";

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
