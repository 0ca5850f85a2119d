//! Inference: the artifact-backed predictor and the static-image preview window

pub mod display;
pub mod predictor;

pub use predictor::{PredictionResult, Predictor, DEFAULT_TOP_K};
