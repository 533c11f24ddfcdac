//! Dataset module for clock images
//!
//! Image decoding and dataset partitioning happen outside this crate; this
//! module only provides what the training and evaluation loops consume:
//! - `ClockItem`: one grayscale image with its hour and minute labels
//! - Burn `Dataset` and `Batcher` implementations
//! - `BatchSource`: the fixed-size batch producer the loops pull from
//! - A deterministic synthetic clock renderer for demos and tests

pub mod burn_dataset;
pub mod synthetic;

use serde::{Deserialize, Serialize};

// Re-export main types for convenience
pub use burn_dataset::{
    BatchSource, ClockBatch, ClockBatcher, ClockDataset, ClockItem, DatasetBatchSource,
};
pub use synthetic::{render_clock, SyntheticClocks};

/// Hour classes (0-11)
pub const NUM_HOURS: usize = 12;

/// Minute classes (0-59)
pub const NUM_MINUTES: usize = 60;

/// Which half of the time a label or head refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Hours,
    Minutes,
}

impl TimeUnit {
    /// Number of classes of the matching head
    pub fn num_classes(&self) -> usize {
        match self {
            TimeUnit::Hours => NUM_HOURS,
            TimeUnit::Minutes => NUM_MINUTES,
        }
    }

    /// Singular label name used in errors
    pub fn label_name(&self) -> &'static str {
        match self {
            TimeUnit::Hours => "hour",
            TimeUnit::Minutes => "minute",
        }
    }

    /// Loss scope name
    pub fn scope(&self) -> &'static str {
        match self {
            TimeUnit::Hours => "hours",
            TimeUnit::Minutes => "minutes",
        }
    }
}

impl std::fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.scope())
    }
}
