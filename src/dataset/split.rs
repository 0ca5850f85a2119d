//! Seeded train/validation split
//!
//! All samples are shuffled once with a fixed seed, then the trailing
//! `floor(n * validation_fraction)` samples become the validation set. The
//! same seed and file list always produce the same split.

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::loader::ImageSample;
use crate::utils::{Result, WasteSortError};

/// Configuration for the train/validation split
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of samples held out for validation
    pub validation_fraction: f64,
    /// Shuffle seed
    pub seed: u64,
    /// Cap on the total number of samples used (quick runs)
    pub max_samples: Option<usize>,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            validation_fraction: 0.2,
            seed: 123,
            max_samples: None,
        }
    }
}

impl SplitConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.validation_fraction) {
            return Err(WasteSortError::Config(format!(
                "validation_fraction must be in [0, 1), got {}",
                self.validation_fraction
            )));
        }
        if self.max_samples == Some(0) {
            return Err(WasteSortError::Config(
                "max_samples must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Train and validation partitions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSplits {
    pub train: Vec<ImageSample>,
    pub validation: Vec<ImageSample>,
}

impl DatasetSplits {
    /// Split `samples` according to `config`
    pub fn from_samples(samples: &[ImageSample], config: &SplitConfig) -> Result<Self> {
        config.validate()?;

        let mut shuffled = samples.to_vec();
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        shuffled.shuffle(&mut rng);

        if let Some(max) = config.max_samples {
            shuffled.truncate(max);
        }

        let n_val = (shuffled.len() as f64 * config.validation_fraction).floor() as usize;
        let n_train = shuffled.len() - n_val;

        if n_train == 0 {
            return Err(WasteSortError::Dataset(
                "Training split is empty; add more images".to_string(),
            ));
        }
        if config.validation_fraction > 0.0 && n_val == 0 {
            return Err(WasteSortError::Dataset(format!(
                "Validation split is empty: {} images with fraction {}",
                shuffled.len(),
                config.validation_fraction
            )));
        }

        let validation = shuffled.split_off(n_train);
        info!(
            "Using {} files for training, {} files for validation",
            shuffled.len(),
            validation.len()
        );

        Ok(Self {
            train: shuffled,
            validation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn create_samples(n: usize) -> Vec<ImageSample> {
        (0..n)
            .map(|i| ImageSample {
                path: PathBuf::from(format!("class_{}/img_{}.jpg", i % 3, i)),
                label: i % 3,
            })
            .collect()
    }

    #[test]
    fn test_default_split_sizes() {
        let samples = create_samples(103);
        let splits = DatasetSplits::from_samples(&samples, &SplitConfig::default()).unwrap();

        // floor(103 * 0.2) = 20
        assert_eq!(splits.validation.len(), 20);
        assert_eq!(splits.train.len(), 83);
    }

    #[test]
    fn test_split_is_disjoint_and_complete() {
        let samples = create_samples(50);
        let splits = DatasetSplits::from_samples(&samples, &SplitConfig::default()).unwrap();

        let train: HashSet<_> = splits.train.iter().map(|s| s.path.clone()).collect();
        let val: HashSet<_> = splits.validation.iter().map(|s| s.path.clone()).collect();
        assert!(train.is_disjoint(&val));
        assert_eq!(train.len() + val.len(), 50);
    }

    #[test]
    fn test_reproducibility() {
        let samples = create_samples(40);
        let config = SplitConfig::default();
        let a = DatasetSplits::from_samples(&samples, &config).unwrap();
        let b = DatasetSplits::from_samples(&samples, &config).unwrap();
        assert_eq!(a.train, b.train);
        assert_eq!(a.validation, b.validation);

        let other = SplitConfig {
            seed: 7,
            ..SplitConfig::default()
        };
        let c = DatasetSplits::from_samples(&samples, &other).unwrap();
        assert_ne!(a.train, c.train);
    }

    #[test]
    fn test_max_samples() {
        let samples = create_samples(100);
        let config = SplitConfig {
            max_samples: Some(10),
            ..SplitConfig::default()
        };
        let splits = DatasetSplits::from_samples(&samples, &config).unwrap();
        assert_eq!(splits.train.len() + splits.validation.len(), 10);
    }

    #[test]
    fn test_too_few_samples_for_validation() {
        let samples = create_samples(3);
        let result = DatasetSplits::from_samples(&samples, &SplitConfig::default());
        assert!(matches!(result, Err(WasteSortError::Dataset(_))));
    }

    #[test]
    fn test_invalid_fraction() {
        let config = SplitConfig {
            validation_fraction: 1.5,
            ..SplitConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
