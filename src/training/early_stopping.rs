//! Early stopping on validation loss

use super::config::EarlyStoppingConfig;

/// Outcome of feeding one epoch's validation loss to [`EarlyStopping`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopDecision {
    /// This epoch set a new best validation loss
    pub improved: bool,
    /// Training should end after this epoch
    pub stop: bool,
}

/// Tracks the best validation loss and the number of epochs since it
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    config: EarlyStoppingConfig,
    best_loss: f64,
    best_epoch: Option<usize>,
    wait: usize,
    stopped_epoch: Option<usize>,
}

impl EarlyStopping {
    pub fn new(config: EarlyStoppingConfig) -> Self {
        Self {
            config,
            best_loss: f64::INFINITY,
            best_epoch: None,
            wait: 0,
            stopped_epoch: None,
        }
    }

    /// Record the validation loss of `epoch` (0-based)
    ///
    /// Improvement always resets the counter; stopping is only requested
    /// when enabled and `patience` epochs in a row failed to improve.
    pub fn update(&mut self, epoch: usize, val_loss: f64) -> StopDecision {
        let improved = val_loss < self.best_loss - self.config.min_delta;

        if improved {
            self.best_loss = val_loss;
            self.best_epoch = Some(epoch);
            self.wait = 0;
        } else {
            self.wait += 1;
        }

        let stop = self.config.enabled && self.wait >= self.config.patience;
        if stop {
            self.stopped_epoch = Some(epoch);
        }

        StopDecision { improved, stop }
    }

    pub fn best_loss(&self) -> Option<f64> {
        self.best_epoch.map(|_| self.best_loss)
    }

    /// 0-based epoch with the lowest validation loss so far
    pub fn best_epoch(&self) -> Option<usize> {
        self.best_epoch
    }

    pub fn stopped_epoch(&self) -> Option<usize> {
        self.stopped_epoch
    }

    /// Best weights are restored only when early stopping is active
    pub fn should_restore_best(&self) -> bool {
        self.config.enabled && self.config.restore_best_weights
    }

    pub fn patience(&self) -> usize {
        self.config.patience
    }
}
