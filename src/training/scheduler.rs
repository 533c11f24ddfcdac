//! Learning Rate Scheduler Module
//!
//! Exponential decay indexed by the global step:
//! `lr = initial_lr * decay_factor ^ (global_step / decay_steps)`, with the
//! exponent floored when `staircase` is set.

use serde::{Deserialize, Serialize};

use crate::model::config::TrainingConfig;
use crate::utils::error::{ClockError, Result};

/// Step-indexed exponential learning-rate decay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExponentialDecay {
    pub initial_lr: f64,
    pub decay_factor: f64,
    pub decay_steps: usize,
    /// Drop the rate in discrete steps instead of continuously
    pub staircase: bool,
}

impl ExponentialDecay {
    pub fn new(initial_lr: f64, decay_factor: f64, decay_steps: usize, staircase: bool) -> Result<Self> {
        if decay_steps == 0 {
            return Err(ClockError::Config("decay_steps must be greater than 0".to_string()));
        }

        Ok(Self {
            initial_lr,
            decay_factor,
            decay_steps,
            staircase,
        })
    }

    /// Staircase schedule of the training configuration
    pub fn from_config(config: &TrainingConfig) -> Result<Self> {
        Self::new(
            config.initial_learning_rate,
            config.decay_factor,
            config.decay_steps(),
            true,
        )
    }

    /// Learning rate at the given global step
    pub fn get_lr(&self, global_step: usize) -> f64 {
        let exponent = if self.staircase {
            (global_step / self.decay_steps) as f64
        } else {
            global_step as f64 / self.decay_steps as f64
        };
        self.initial_lr * self.decay_factor.powf(exponent)
    }

    pub fn description(&self) -> String {
        format!(
            "Exponential decay: initial={:.6}, factor={}, every {} steps{}",
            self.initial_lr,
            self.decay_factor,
            self.decay_steps,
            if self.staircase { " (staircase)" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staircase_decay() {
        let scheduler = ExponentialDecay::new(0.1, 0.1, 10, true).unwrap();

        assert_eq!(scheduler.get_lr(0), 0.1);
        assert_eq!(scheduler.get_lr(9), 0.1);
        assert!((scheduler.get_lr(10) - 0.01).abs() < 1e-12);
        assert!((scheduler.get_lr(19) - 0.01).abs() < 1e-12);
        assert!((scheduler.get_lr(25) - 0.001).abs() < 1e-12);
    }

    #[test]
    fn test_continuous_decay() {
        let scheduler = ExponentialDecay::new(1.0, 0.5, 2, false).unwrap();
        assert!((scheduler.get_lr(1) - 0.5f64.sqrt()).abs() < 1e-12);
        assert!((scheduler.get_lr(4) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_from_default_config() {
        let scheduler = ExponentialDecay::from_config(&TrainingConfig::default()).unwrap();
        assert_eq!(scheduler.decay_steps, 273);
        assert!(scheduler.staircase);
        assert_eq!(scheduler.get_lr(272), 0.1);
        assert!((scheduler.get_lr(273) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_zero_decay_steps_rejected() {
        assert!(ExponentialDecay::new(0.1, 0.1, 0, true).is_err());

        let config = TrainingConfig {
            examples_per_epoch_train: 1,
            epochs_per_decay: 1.0,
            ..Default::default()
        };
        assert!(ExponentialDecay::from_config(&config).is_err());
    }
}
