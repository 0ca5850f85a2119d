//! Utilities: error type, logging setup and small formatting helpers

pub mod error;
pub mod logging;

pub use error::{Result, WasteSortError};
pub use logging::init_logging;

use std::path::Path;

use serde::de::DeserializeOwned;

/// Format a duration in a human-readable way
pub fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("{:.1}s", seconds)
    } else if seconds < 3600.0 {
        let minutes = (seconds / 60.0).floor();
        let secs = seconds % 60.0;
        format!("{}m {:.0}s", minutes as u32, secs)
    } else {
        let hours = (seconds / 3600.0).floor();
        let minutes = ((seconds % 3600.0) / 60.0).floor();
        format!("{}h {}m", hours as u32, minutes as u32)
    }
}

/// Render a fraction in [0, 1] as a bar of `width` cells
pub fn format_progress_bar(progress: f64, width: usize) -> String {
    let filled = (progress.clamp(0.0, 1.0) * width as f64).round() as usize;
    let empty = width.saturating_sub(filled);
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

/// Read a TOML file into any deserializable config type
pub fn load_toml_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    if !path.exists() {
        return Err(WasteSortError::PathNotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| {
        WasteSortError::Config(format!("Failed to parse config {}: {e}", path.display()))
    })
}
