//! Training: configuration, early stopping, history and the fine-tuning loop

pub mod config;
pub mod early_stopping;
pub mod history;
pub mod trainer;

pub use config::{EarlyStoppingConfig, ModelOptions, TrainingConfig};
pub use early_stopping::{EarlyStopping, StopDecision};
pub use history::{EpochMetrics, TrainingHistory};
pub use trainer::{run_training, TrainingSummary};
