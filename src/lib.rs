//! # Clock Reader
//!
//! A Rust library that reads the time from analog clock images with a small
//! convolutional network built on the Burn framework.
//!
//! ## Features
//!
//! - **Shared trunk, two heads**: one feature extractor feeding an hours head
//!   (12 classes) and a minutes head (60 classes)
//! - **Scoped losses**: weight decay is collected explicitly per owner, so the
//!   multi-task objective never counts a term twice
//! - **Circular metric**: time error measured around a 12-hour dial
//! - **Classic training loop**: staircase learning-rate decay, plain gradient
//!   descent and moving averages of losses and parameters
//!
//! ## Modules
//!
//! - `dataset`: Clock items, Burn batching and a synthetic clock renderer
//! - `model`: Weight store, layers, trunk and classification heads
//! - `training`: Losses, schedule, moving averages and the trainer
//! - `evaluation`: Precision and prediction loops, time-error metric
//! - `utils`: Logging, errors and helper functions
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use clock_reader::backend::{default_device, TrainingBackend};
//! use clock_reader::model::{ClockNetConfig, MultiTaskTimeReader, WeightStore};
//! use clock_reader::training::{Trainer, TrainingConfig};
//!
//! let device = default_device();
//! let mut store = WeightStore::<TrainingBackend>::new(&device);
//! let model = MultiTaskTimeReader::new(&mut store, &ClockNetConfig::new())?;
//! let mut trainer = Trainer::new(model, TrainingConfig::default(), device)?;
//! // ... trainer.step(&batch)?
//! ```

pub mod backend;
pub mod dataset;
pub mod evaluation;
pub mod model;
pub mod training;
pub mod utils;

// Re-export commonly used items for convenience
pub use dataset::{
    BatchSource, ClockBatch, ClockBatcher, ClockDataset, ClockItem, DatasetBatchSource,
    SyntheticClocks, TimeUnit,
};
pub use evaluation::{StopSignal, TimeError, TimeOfDay};
pub use model::{ClockNetConfig, MultiTaskTimeReader, TimeModel, TimeReader, WeightStore};
pub use training::{Trainer, TrainingConfig};
pub use utils::error::{ClockError, Result};

/// Hour classes
pub const NUM_HOURS: usize = dataset::NUM_HOURS;

/// Minute classes
pub const NUM_MINUTES: usize = dataset::NUM_MINUTES;

/// Default image size (square)
pub const IMAGE_SIZE: usize = 32;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
