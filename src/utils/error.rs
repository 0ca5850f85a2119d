//! Error Handling Module
//!
//! Defines the error type shared by the waste_sort library.
//! Uses thiserror for ergonomic error definitions; the CLI wraps it in anyhow.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for waste_sort operations
#[derive(Error, Debug)]
pub enum WasteSortError {
    /// Error loading, decoding or writing an image
    #[error("Failed to load image at '{}': {}", .0.display(), .1)]
    ImageLoad(PathBuf, String),

    /// Error with dataset discovery or loading
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model construction, saving or loading
    #[error("Model error: {0}")]
    Model(String),

    /// Error during training
    #[error("Training error: {0}")]
    Training(String),

    /// Error during inference
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Camera device error
    #[error("Camera error: {0}")]
    Camera(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Path not found
    #[error("Path not found: {}", .0.display())]
    PathNotFound(PathBuf),
}

/// Convenience Result type for waste_sort operations
pub type Result<T> = std::result::Result<T, WasteSortError>;

impl From<image::ImageError> for WasteSortError {
    fn from(err: image::ImageError) -> Self {
        WasteSortError::ImageLoad(PathBuf::new(), err.to_string())
    }
}

impl From<serde_json::Error> for WasteSortError {
    fn from(err: serde_json::Error) -> Self {
        WasteSortError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for WasteSortError {
    fn from(err: toml::de::Error) -> Self {
        WasteSortError::Config(err.to_string())
    }
}

impl WasteSortError {
    /// Attach a path to an image error produced without one
    pub fn image_at(path: impl Into<PathBuf>, err: image::ImageError) -> Self {
        WasteSortError::ImageLoad(path.into(), err.to_string())
    }
}
