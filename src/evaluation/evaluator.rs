//! Batched evaluation loops
//!
//! Both loops run `ceil(num_records / batch_size)` full batches, so they may
//! look at more samples than requested; `total_sample_count` is always the
//! rounded-up count. A [`StopSignal`] is polled before each batch and an early
//! stop returns the aggregates gathered so far.

use burn::tensor::{backend::Backend, Int, Tensor};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::metric::{argmax_classes, time_error, TimeError, TimeOfDay};
use super::stop::StopSignal;
use crate::dataset::BatchSource;
use crate::model::{MultiTaskTimeReader, TimeModel};
use crate::utils::error::{ClockError, Result};

/// Number of batches needed to cover `num_records`
pub fn batch_count(num_records: usize, batch_size: usize) -> Result<usize> {
    if batch_size == 0 {
        return Err(ClockError::Config("batch_size must be greater than 0".to_string()));
    }
    Ok(num_records.div_ceil(batch_size))
}

fn planned_samples(num_records: usize, batch_size: usize) -> Result<(usize, usize)> {
    let num_batches = batch_count(num_records, batch_size)?;
    if num_batches == 0 {
        return Err(ClockError::EmptyBatch("no records to evaluate".to_string()));
    }
    Ok((num_batches, num_batches * batch_size))
}

/// Top-1 correctness of each row of `logits` against `labels`
pub fn correct_predictions<B: Backend>(
    logits: Tensor<B, 2>,
    labels: Tensor<B, 1, Int>,
) -> Result<Vec<bool>> {
    let predicted = argmax_classes(logits)?;
    let labels = label_classes(labels)?;

    if predicted.len() != labels.len() {
        return Err(ClockError::ShapeMismatch {
            context: "correctness labels".to_string(),
            expected: vec![predicted.len()],
            actual: vec![labels.len()],
        });
    }

    Ok(predicted
        .into_iter()
        .zip(labels)
        .map(|(p, l)| p == l)
        .collect())
}

/// Precision of every operator over one evaluation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionReport {
    /// `correct / total_sample_count`, one per operator
    pub precisions: Vec<f64>,
    pub correct_counts: Vec<usize>,
    pub total_sample_count: usize,
    pub batches_run: usize,
    pub stopped_early: bool,
}

/// Accumulate correctness indicators over `ceil(num_records / batch_size)` batches.
///
/// `run_batch` receives the batch index and returns one correctness vector
/// per operator; every batch must yield exactly `num_operators` vectors.
pub fn evaluate_precision<F>(
    signal: &StopSignal,
    num_records: usize,
    batch_size: usize,
    num_operators: usize,
    mut run_batch: F,
) -> Result<PrecisionReport>
where
    F: FnMut(usize) -> Result<Vec<Vec<bool>>>,
{
    let (num_batches, total_sample_count) = planned_samples(num_records, batch_size)?;

    let mut correct_counts = vec![0usize; num_operators];
    let mut batches_run = 0;
    let mut stopped_early = false;

    for batch_idx in 0..num_batches {
        if signal.should_stop() {
            warn!("Evaluation stopped after {}/{} batches", batches_run, num_batches);
            stopped_early = true;
            break;
        }

        let indicators = run_batch(batch_idx)?;
        if indicators.len() != num_operators {
            return Err(ClockError::ShapeMismatch {
                context: "correctness operators".to_string(),
                expected: vec![num_operators],
                actual: vec![indicators.len()],
            });
        }

        for (count, operator) in correct_counts.iter_mut().zip(&indicators) {
            *count += operator.iter().filter(|&&correct| correct).count();
        }
        batches_run += 1;

        debug!("Evaluated batch {}/{}", batches_run, num_batches);
    }

    let precisions = correct_counts
        .iter()
        .map(|&correct| correct as f64 / total_sample_count as f64)
        .collect();

    Ok(PrecisionReport {
        precisions,
        correct_counts,
        total_sample_count,
        batches_run,
        stopped_early,
    })
}

/// Precision @ 1 of every head of `model`, in head order
pub fn evaluate_model<B, M, S>(
    signal: &StopSignal,
    model: &M,
    source: &mut S,
    num_records: usize,
) -> Result<PrecisionReport>
where
    B: Backend,
    M: TimeModel<B>,
    S: BatchSource<B>,
{
    let batch_size = source.batch_size();
    let num_heads = model.heads().len();
    let report = evaluate_precision(signal, num_records, batch_size, num_heads, |_| {
        let batch = source.next_batch()?;
        model
            .head_logits(batch.images.clone())?
            .into_iter()
            .map(|(unit, logits)| correct_predictions(logits, batch.labels(unit)))
            .collect()
    })?;

    for (i, precision) in report.precisions.iter().enumerate() {
        info!("precision @ 1 [head {}] = {:.3}", i, precision);
    }

    Ok(report)
}

/// Predicted and true times collected by [`compute_time_predictions`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimePredictions {
    pub predicted: Vec<TimeOfDay>,
    pub truth: Vec<TimeOfDay>,
    pub total_sample_count: usize,
    pub batches_run: usize,
    pub stopped_early: bool,
}

impl TimePredictions {
    /// Circular error over everything collected
    pub fn time_error(&self) -> Result<TimeError> {
        time_error(&self.predicted, &self.truth)
    }
}

/// Argmax hour and minute of every sample, paired with its labels
pub fn compute_time_predictions<B, S>(
    signal: &StopSignal,
    model: &MultiTaskTimeReader<B>,
    source: &mut S,
    num_records: usize,
) -> Result<TimePredictions>
where
    B: Backend,
    S: BatchSource<B>,
{
    let (num_batches, total_sample_count) = planned_samples(num_records, source.batch_size())?;

    let mut predicted = Vec::with_capacity(total_sample_count);
    let mut truth = Vec::with_capacity(total_sample_count);
    let mut batches_run = 0;
    let mut stopped_early = false;

    for _ in 0..num_batches {
        if signal.should_stop() {
            warn!("Prediction stopped after {}/{} batches", batches_run, num_batches);
            stopped_early = true;
            break;
        }

        let batch = source.next_batch()?;
        let (logits_hours, logits_minutes) = model.forward(batch.images.clone())?;

        let hours = argmax_classes(logits_hours)?;
        let minutes = argmax_classes(logits_minutes)?;
        let true_hours = label_classes(batch.hours)?;
        let true_minutes = label_classes(batch.minutes)?;

        predicted.extend(hours.into_iter().zip(minutes).map(|(h, m)| TimeOfDay::new(h, m)));
        truth.extend(true_hours.into_iter().zip(true_minutes).map(|(h, m)| TimeOfDay::new(h, m)));
        batches_run += 1;
    }

    Ok(TimePredictions {
        predicted,
        truth,
        total_sample_count,
        batches_run,
        stopped_early,
    })
}

fn label_classes<B: Backend>(labels: Tensor<B, 1, Int>) -> Result<Vec<usize>> {
    let values = labels
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| ClockError::TensorData(format!("{:?}", e)))?;
    Ok(values.into_iter().map(|v| v as usize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ClockBatch, ClockBatcher, DatasetBatchSource, SyntheticClocks};
    use crate::model::{ClockNetConfig, WeightStore};
    use burn::tensor::TensorData;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    /// Raises the stop signal once `remaining` batches have been handed out
    struct StopAfter<S> {
        inner: S,
        signal: StopSignal,
        remaining: usize,
    }

    impl<B: Backend, S: BatchSource<B>> BatchSource<B> for StopAfter<S> {
        fn next_batch(&mut self) -> Result<ClockBatch<B>> {
            self.remaining = self.remaining.saturating_sub(1);
            if self.remaining == 0 {
                self.signal.stop();
            }
            self.inner.next_batch()
        }

        fn batch_size(&self) -> usize {
            self.inner.batch_size()
        }
    }

    #[test]
    fn test_batch_count() {
        assert_eq!(batch_count(100, 30).unwrap(), 4);
        assert_eq!(batch_count(90, 30).unwrap(), 3);
        assert_eq!(batch_count(0, 30).unwrap(), 0);
        assert!(batch_count(10, 0).is_err());
    }

    #[test]
    fn test_rounded_up_sample_count() {
        let signal = StopSignal::new();
        let mut calls = 0;
        let report = evaluate_precision(&signal, 100, 30, 2, |_| {
            calls += 1;
            Ok(vec![vec![true; 30], vec![false; 30]])
        })
        .unwrap();

        assert_eq!(calls, 4);
        assert_eq!(report.batches_run, 4);
        assert_eq!(report.total_sample_count, 120);
        assert_eq!(report.precisions, vec![1.0, 0.0]);
        assert!(!report.stopped_early);
    }

    #[test]
    fn test_precision_is_correct_over_total() {
        let signal = StopSignal::new();
        let report = evaluate_precision(&signal, 10, 4, 1, |batch_idx| {
            Ok(vec![vec![batch_idx % 2 == 0, true, false, false]])
        })
        .unwrap();

        // 3 batches: 2 + 1 + 2 correct out of 12
        assert_eq!(report.correct_counts, vec![5]);
        assert!((report.precisions[0] - 5.0 / 12.0).abs() < 1e-12);
        assert!((0.0..=1.0).contains(&report.precisions[0]));
    }

    #[test]
    fn test_stop_before_each_batch() {
        let signal = StopSignal::new();
        let handle = signal.clone();
        let report = evaluate_precision(&signal, 100, 10, 1, |batch_idx| {
            if batch_idx == 1 {
                handle.stop();
            }
            Ok(vec![vec![true; 10]])
        })
        .unwrap();

        assert!(report.stopped_early);
        assert_eq!(report.batches_run, 2);
        assert_eq!(report.correct_counts, vec![20]);
        assert_eq!(report.total_sample_count, 100);
        assert!((report.precisions[0] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_operator_count_must_be_stable() {
        let signal = StopSignal::new();
        let result = evaluate_precision(&signal, 20, 10, 1, |batch_idx| {
            Ok(vec![vec![true; 10]; batch_idx + 1])
        });
        assert!(matches!(result, Err(ClockError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_stop_before_first_batch_keeps_every_operator() {
        let signal = StopSignal::new();
        signal.stop();

        let mut calls = 0;
        let report = evaluate_precision(&signal, 100, 10, 2, |_| {
            calls += 1;
            Ok(vec![vec![true; 10], vec![true; 10]])
        })
        .unwrap();

        assert_eq!(calls, 0);
        assert!(report.stopped_early);
        assert_eq!(report.batches_run, 0);
        assert_eq!(report.correct_counts, vec![0, 0]);
        assert_eq!(report.precisions, vec![0.0, 0.0]);
        assert_eq!(report.total_sample_count, 100);
    }

    #[test]
    fn test_no_records_is_an_error() {
        let signal = StopSignal::new();
        assert!(evaluate_precision(&signal, 0, 10, 1, |_| Ok(vec![vec![]])).is_err());
    }

    #[test]
    fn test_correct_predictions() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats(
            [[0.1, 0.9, 0.0], [2.0, 0.0, 1.0], [0.0, 0.0, 3.0]],
            &device,
        );
        let labels =
            Tensor::<TestBackend, 1, Int>::from_data(TensorData::new(vec![1i64, 2, 2], [3]), &device);

        assert_eq!(correct_predictions(logits, labels).unwrap(), vec![true, false, true]);
    }

    #[test]
    fn test_time_predictions_cover_rounded_batches() {
        let device = Default::default();
        let config = ClockNetConfig::new().with_image_size1(6).with_image_size2(6);
        let mut store = WeightStore::<TestBackend>::new(&device);
        let model = MultiTaskTimeReader::new(&mut store, &config).unwrap();

        let dataset = SyntheticClocks::new(3, [6, 6]).dataset(7).unwrap();
        let batcher = ClockBatcher::new(device, [6, 6]);
        let mut source = DatasetBatchSource::new(dataset, batcher, 3).unwrap();

        let signal = StopSignal::new();
        let predictions = compute_time_predictions(&signal, &model, &mut source, 7).unwrap();

        assert_eq!(predictions.batches_run, 3);
        assert_eq!(predictions.total_sample_count, 9);
        assert_eq!(predictions.predicted.len(), 9);
        assert_eq!(predictions.truth.len(), 9);
        assert!(predictions
            .predicted
            .iter()
            .all(|t| t.hour < 12 && t.minute < 60));

        let err = predictions.time_error().unwrap();
        assert!(err.combined >= 0.0 && err.combined <= 360.0);
    }

    #[test]
    fn test_time_predictions_stop_mid_run() {
        let device = Default::default();
        let config = ClockNetConfig::new().with_image_size1(6).with_image_size2(6);
        let mut store = WeightStore::<TestBackend>::new(&device);
        let model = MultiTaskTimeReader::new(&mut store, &config).unwrap();

        let dataset = SyntheticClocks::new(7, [6, 6]).dataset(10).unwrap();
        let batcher = ClockBatcher::new(device, [6, 6]);
        let signal = StopSignal::new();
        let mut source = StopAfter {
            inner: DatasetBatchSource::new(dataset, batcher, 3).unwrap(),
            signal: signal.clone(),
            remaining: 2,
        };

        let predictions = compute_time_predictions(&signal, &model, &mut source, 10).unwrap();

        assert!(predictions.stopped_early);
        assert_eq!(predictions.batches_run, 2);
        assert_eq!(predictions.predicted.len(), predictions.batches_run * 3);
        assert_eq!(predictions.truth.len(), predictions.batches_run * 3);
        // ceil(10 / 3) * 3 planned
        assert_eq!(predictions.total_sample_count, 12);
        assert!(predictions.time_error().is_ok());
    }

    #[test]
    fn test_evaluate_model_stopped_before_first_batch() {
        let device = Default::default();
        let config = ClockNetConfig::new().with_image_size1(6).with_image_size2(6);
        let mut store = WeightStore::<TestBackend>::new(&device);
        let model = MultiTaskTimeReader::new(&mut store, &config).unwrap();

        let dataset = SyntheticClocks::new(9, [6, 6]).dataset(4).unwrap();
        let batcher = ClockBatcher::new(device, [6, 6]);
        let mut source = DatasetBatchSource::new(dataset, batcher, 2).unwrap();

        let signal = StopSignal::new();
        signal.stop();
        let report = evaluate_model(&signal, &model, &mut source, 4).unwrap();
        assert_eq!(report.precisions, vec![0.0, 0.0]);
        assert!(report.stopped_early);
    }

    #[test]
    fn test_evaluate_model_reports_both_heads() {
        let device = Default::default();
        let config = ClockNetConfig::new().with_image_size1(6).with_image_size2(6);
        let mut store = WeightStore::<TestBackend>::new(&device);
        let model = MultiTaskTimeReader::new(&mut store, &config).unwrap();

        let dataset = SyntheticClocks::new(5, [6, 6]).dataset(4).unwrap();
        let batcher = ClockBatcher::new(device, [6, 6]);
        let mut source = DatasetBatchSource::new(dataset, batcher, 2).unwrap();

        let signal = StopSignal::new();
        let report = evaluate_model(&signal, &model, &mut source, 4).unwrap();
        assert_eq!(report.precisions.len(), 2);
        assert_eq!(report.total_sample_count, 4);
    }
}
