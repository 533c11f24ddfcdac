//! Model and Training Configuration
//!
//! `ClockNetConfig` fixes the input resolution of the network (it determines
//! the first fully connected layer's fan-in). `TrainingConfig` carries the
//! optimization constants; both are construction-time only.

use std::path::Path;

use burn::config::Config;
use serde::{Deserialize, Serialize};

use crate::utils::error::{ClockError, Result as ClockResult};

/// Output channels of both convolution stages
pub const CONV_CHANNELS: usize = 64;
/// Convolution kernel size
pub const CONV_KERNEL: usize = 5;
/// Units of the first fully connected layer
pub const LOCAL3_UNITS: usize = 384;
/// Width of the shared feature vector
pub const FEATURE_DIM: usize = 192;

/// Input geometry of the clock network
#[derive(Config, Debug)]
pub struct ClockNetConfig {
    /// Image height in pixels
    #[config(default = "32")]
    pub image_size1: usize,

    /// Image width in pixels
    #[config(default = "32")]
    pub image_size2: usize,
}

impl ClockNetConfig {
    /// Fan-in of the first fully connected layer after two stride-2 poolings
    pub fn flattened_dim(&self) -> usize {
        let height = self.image_size1.div_ceil(2).div_ceil(2);
        let width = self.image_size2.div_ceil(2).div_ceil(2);
        height * width * CONV_CHANNELS
    }

    pub fn validate(&self) -> ClockResult<()> {
        if self.image_size1 == 0 || self.image_size2 == 0 {
            return Err(ClockError::Config(format!(
                "image size must be positive, got {}x{}",
                self.image_size1, self.image_size2
            )));
        }
        Ok(())
    }
}

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrainingConfig {
    /// Images per batch
    pub batch_size: usize,

    /// Learning rate before any decay
    pub initial_learning_rate: f64,

    /// Epochs between two learning-rate drops
    pub epochs_per_decay: f64,

    /// Multiplier applied at each drop
    pub decay_factor: f64,

    /// Decay of the trainable-parameter moving averages
    pub moving_average_decay: f64,

    /// Decay of the loss moving averages
    pub loss_average_decay: f64,

    /// Examples per training epoch
    pub examples_per_epoch_train: usize,

    /// Examples per evaluation epoch
    pub examples_per_epoch_eval: usize,

    /// Random seed for reproducibility
    pub seed: u64,

    /// Log a progress line every N steps
    pub log_every: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            batch_size: 128,
            initial_learning_rate: 0.1,
            epochs_per_decay: 700.0,
            decay_factor: 0.1,
            moving_average_decay: 0.9999,
            loss_average_decay: 0.9,
            examples_per_epoch_train: 50,
            examples_per_epoch_eval: 10,
            seed: 42,
            log_every: 10,
        }
    }
}

impl TrainingConfig {
    /// Steps between learning-rate drops: `floor(batches_per_epoch * epochs_per_decay)`
    pub fn decay_steps(&self) -> usize {
        let batches_per_epoch = self.examples_per_epoch_train as f64 / self.batch_size as f64;
        (batches_per_epoch * self.epochs_per_decay).floor() as usize
    }

    /// Validate the configuration
    pub fn validate(&self) -> ClockResult<()> {
        if self.batch_size == 0 {
            return Err(ClockError::Config("batch_size must be greater than 0".to_string()));
        }

        if !(self.initial_learning_rate.is_finite() && self.initial_learning_rate > 0.0) {
            return Err(ClockError::Config(
                "initial_learning_rate must be positive".to_string(),
            ));
        }

        if !(self.decay_factor.is_finite() && self.decay_factor > 0.0) {
            return Err(ClockError::Config("decay_factor must be positive".to_string()));
        }

        for (name, decay) in [
            ("moving_average_decay", self.moving_average_decay),
            ("loss_average_decay", self.loss_average_decay),
        ] {
            if !(0.0..1.0).contains(&decay) {
                return Err(ClockError::Config(format!(
                    "{} must be in range [0.0, 1.0), got {}",
                    name, decay
                )));
            }
        }

        if self.decay_steps() == 0 {
            return Err(ClockError::Config(format!(
                "learning rate would decay every 0 steps ({} examples/epoch, batch {}, {} epochs/decay)",
                self.examples_per_epoch_train, self.batch_size, self.epochs_per_decay
            )));
        }

        Ok(())
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> ClockResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> ClockResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
