//! Model module for the clock-reading CNN
//!
//! This module provides:
//! - The weight store every parameter is declared through
//! - Convolution, pooling and normalization building blocks
//! - The shared feature trunk and the hours/minutes classification heads
//! - Model and training configuration
//!
//! ## Architecture
//!
//! ```text
//! image [N, 1, H, W]
//!   conv1 5x5 (64) -> pool 3x3/2 -> lrn
//!   conv2 5x5 (64) -> lrn -> pool 3x3/2
//!   local3 (384) -> local4 (192)
//!   softmax_linear_hours (12) | softmax_linear_minutes (60)
//! ```

pub mod config;
pub mod heads;
pub mod layers;
pub mod store;
pub mod trunk;

// Re-export main types for convenience
pub use config::{ClockNetConfig, TrainingConfig, FEATURE_DIM};
pub use heads::{MultiTaskTimeReader, TimeModel, TimeReader};
pub use store::{ParamInit, WeightStore};
pub use trunk::FeatureTrunk;
