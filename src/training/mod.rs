//! Training module
//!
//! This module provides:
//! - Scoped loss assembly (cross-entropy plus weight decay)
//! - Staircase learning-rate decay
//! - Moving averages of losses and parameters
//! - The gradient-descent training loop with checkpointing

pub mod averages;
pub mod loss;
pub mod scheduler;
pub mod trainer;

// Re-export main types for convenience
pub use averages::{LossAverages, ParameterAverages, TOTAL_LOSS_KEY};
pub use loss::{loss, loss_multitask, LossCollection, LossKind, LossTerm, MultiTaskLoss, ScopedLoss};
pub use scheduler::ExponentialDecay;
pub use trainer::{load_averaged_model, StepReport, TermReport, Trainer, TrainingSummary};

// Re-export TrainingConfig from model::config where it's defined
pub use crate::model::config::TrainingConfig;
