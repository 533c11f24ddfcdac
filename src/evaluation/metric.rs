//! Circular time-error metric
//!
//! Times are compared on a 12-hour dial, so 11:59 and 0:00 are one minute
//! apart. The combined error comes from the difference of the minute-of-dial
//! values, not from the separate hour and minute errors.

use burn::tensor::{backend::Backend, Tensor};
use serde::{Deserialize, Serialize};

use crate::dataset::{NUM_HOURS, NUM_MINUTES};
use crate::utils::error::{ClockError, Result};

/// Minutes on a 12-hour dial
pub const MINUTES_PER_DIAL: i64 = (NUM_HOURS * NUM_MINUTES) as i64;

/// `v mod m` in `[0, m)` for any sign of `v`
pub fn positive_mod(value: i64, modulus: i64) -> i64 {
    ((value % modulus) + modulus) % modulus
}

/// Shorter way around a dial of `modulus` positions
pub fn circular_distance(delta: i64, modulus: i64) -> i64 {
    positive_mod(delta, modulus).min(positive_mod(-delta, modulus))
}

/// An hour and minute read from a clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeOfDay {
    pub hour: usize,
    pub minute: usize,
}

impl TimeOfDay {
    pub fn new(hour: usize, minute: usize) -> Self {
        Self { hour, minute }
    }

    /// `60 * hour + minute`
    pub fn total_minutes(&self) -> i64 {
        (NUM_MINUTES * self.hour + self.minute) as i64
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{:02}", self.hour, self.minute)
    }
}

/// Batch-mean circular errors
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeError {
    /// Minutes between the two times on the dial
    pub combined: f64,
    /// Hours between the hour labels on a 12-position dial
    pub hours: f64,
    /// Minutes between the minute labels on a 60-position dial
    pub minutes: f64,
}

impl std::fmt::Display for TimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "combined {:.2} min, hours {:.2} h, minutes {:.2} min",
            self.combined, self.hours, self.minutes
        )
    }
}

/// Mean circular errors between aligned predictions and ground truth
pub fn time_error(predicted: &[TimeOfDay], truth: &[TimeOfDay]) -> Result<TimeError> {
    if predicted.len() != truth.len() {
        return Err(ClockError::ShapeMismatch {
            context: "time predictions".to_string(),
            expected: vec![truth.len()],
            actual: vec![predicted.len()],
        });
    }
    if predicted.is_empty() {
        return Err(ClockError::EmptyBatch("time error".to_string()));
    }

    let mut combined = 0i64;
    let mut hours = 0i64;
    let mut minutes = 0i64;

    for (p, t) in predicted.iter().zip(truth) {
        combined += circular_distance(p.total_minutes() - t.total_minutes(), MINUTES_PER_DIAL);
        hours += circular_distance(p.hour as i64 - t.hour as i64, NUM_HOURS as i64);
        minutes += circular_distance(p.minute as i64 - t.minute as i64, NUM_MINUTES as i64);
    }

    let n = predicted.len() as f64;
    Ok(TimeError {
        combined: combined as f64 / n,
        hours: hours as f64 / n,
        minutes: minutes as f64 / n,
    })
}

/// Argmax class per row, read back to the host
pub fn argmax_classes<B: Backend>(logits: Tensor<B, 2>) -> Result<Vec<usize>> {
    let classes = logits
        .argmax(1)
        .squeeze::<1>(1)
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| ClockError::TensorData(format!("{:?}", e)))?;

    Ok(classes.into_iter().map(|class| class as usize).collect())
}

/// `time_error` on the argmax of the hours and minutes logits
pub fn time_error_from_logits<B: Backend>(
    logits_hours: Tensor<B, 2>,
    logits_minutes: Tensor<B, 2>,
    truth: &[TimeOfDay],
) -> Result<TimeError> {
    let hours = argmax_classes(logits_hours)?;
    let minutes = argmax_classes(logits_minutes)?;

    if hours.len() != minutes.len() {
        return Err(ClockError::ShapeMismatch {
            context: "minutes logits".to_string(),
            expected: vec![hours.len()],
            actual: vec![minutes.len()],
        });
    }

    let predicted: Vec<TimeOfDay> = hours
        .into_iter()
        .zip(minutes)
        .map(|(hour, minute)| TimeOfDay::new(hour, minute))
        .collect();

    time_error(&predicted, truth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn t(hour: usize, minute: usize) -> TimeOfDay {
        TimeOfDay::new(hour, minute)
    }

    #[test]
    fn test_positive_mod_range() {
        for modulus in [12, 60, 720] {
            for value in -2000..2000 {
                let r = positive_mod(value, modulus);
                assert!((0..modulus).contains(&r));
            }
        }
        assert_eq!(positive_mod(-1, 12), 11);
        assert_eq!(positive_mod(-716, 720), 4);
    }

    #[test]
    fn test_circular_distance_is_symmetric() {
        for modulus in [12, 60, 720] {
            for delta in -800..800 {
                assert_eq!(circular_distance(delta, modulus), circular_distance(-delta, modulus));
                assert!(circular_distance(delta, modulus) <= modulus / 2);
            }
        }
    }

    #[test]
    fn test_wrap_within_the_hour() {
        let err = time_error(&[t(10, 2)], &[t(9, 58)]).unwrap();
        assert_eq!(err.combined, 4.0);
        assert_eq!(err.hours, 1.0);
        assert_eq!(err.minutes, 4.0);
    }

    #[test]
    fn test_wrap_at_twelve() {
        let err = time_error(&[t(0, 0)], &[t(11, 59)]).unwrap();
        assert_eq!(err.combined, 1.0);
        assert_eq!(err.hours, 1.0);
        assert_eq!(err.minutes, 1.0);
    }

    #[test]
    fn test_batch_mean() {
        let err = time_error(&[t(3, 0), t(6, 30)], &[t(3, 0), t(0, 30)]).unwrap();
        assert_eq!(err.combined, 180.0);
        assert_eq!(err.hours, 3.0);
        assert_eq!(err.minutes, 0.0);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(time_error(&[], &[]), Err(ClockError::EmptyBatch(_))));
        assert!(matches!(
            time_error(&[t(1, 1)], &[]),
            Err(ClockError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_from_logits() {
        let device = Default::default();

        let mut hours = vec![0.0f32; 2 * 12];
        hours[10] = 5.0;
        hours[12] = 5.0;
        let mut minutes = vec![0.0f32; 2 * 60];
        minutes[2] = 5.0;
        minutes[60 + 59] = 5.0;

        let logits_hours = Tensor::<TestBackend, 2>::from_data(
            burn::tensor::TensorData::new(hours, [2, 12]),
            &device,
        );
        let logits_minutes = Tensor::<TestBackend, 2>::from_data(
            burn::tensor::TensorData::new(minutes, [2, 60]),
            &device,
        );

        // Predictions (10, 2) and (0, 59) against (9, 58) and (0, 0).
        let err = time_error_from_logits(logits_hours, logits_minutes, &[t(9, 58), t(0, 0)]).unwrap();
        assert_eq!(err.combined, (4.0 + 59.0) / 2.0);
        assert_eq!(err.hours, 0.5);
        assert_eq!(err.minutes, (4.0 + 1.0) / 2.0);
    }
}
