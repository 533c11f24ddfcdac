//! Evaluation module
//!
//! - Circular time-error metric on a 12-hour dial
//! - Batched precision and prediction-extraction loops
//! - Cooperative stop signal shared with the training loop

pub mod evaluator;
pub mod metric;
pub mod stop;

// Re-export main types for convenience
pub use evaluator::{
    batch_count, compute_time_predictions, correct_predictions, evaluate_model,
    evaluate_precision, PrecisionReport, TimePredictions,
};
pub use metric::{
    circular_distance, positive_mod, time_error, time_error_from_logits, TimeError, TimeOfDay,
};
pub use stop::StopSignal;
