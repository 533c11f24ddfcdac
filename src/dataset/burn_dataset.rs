//! Burn Dataset Integration for clock images
//!
//! Implements Burn's Dataset trait and Batcher, plus the `BatchSource`
//! producer that hands fixed-size batches to the training and evaluation
//! loops.

use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use super::TimeUnit;
use crate::utils::error::{ClockError, Result};

/// A single clock image ready for Burn
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClockItem {
    /// Grayscale pixels, row-major `[height * width]`, values in [0, 1]
    pub image: Vec<f32>,
    /// Hour label (0-11)
    pub hour: usize,
    /// Minute label (0-59)
    pub minute: usize,
}

impl ClockItem {
    /// Create an item, rejecting out-of-range labels
    pub fn new(image: Vec<f32>, hour: usize, minute: usize) -> Result<Self> {
        for (unit, value) in [(TimeUnit::Hours, hour), (TimeUnit::Minutes, minute)] {
            if value >= unit.num_classes() {
                return Err(ClockError::InvalidLabel {
                    unit: unit.label_name().to_string(),
                    value: value as i64,
                    num_classes: unit.num_classes(),
                });
            }
        }

        Ok(Self {
            image,
            hour,
            minute,
        })
    }
}

/// In-memory clock dataset implementing Burn's Dataset trait
#[derive(Debug, Clone)]
pub struct ClockDataset {
    items: Vec<ClockItem>,
    image_size: [usize; 2],
}

impl ClockDataset {
    /// Create a dataset, checking every image has `height * width` pixels
    pub fn new(items: Vec<ClockItem>, image_size: [usize; 2]) -> Result<Self> {
        let pixels = image_size[0] * image_size[1];
        if let Some(bad) = items.iter().find(|item| item.image.len() != pixels) {
            return Err(ClockError::ShapeMismatch {
                context: "clock item pixels".to_string(),
                expected: vec![pixels],
                actual: vec![bad.image.len()],
            });
        }

        Ok(Self { items, image_size })
    }

    /// `[height, width]` of every image
    pub fn image_size(&self) -> [usize; 2] {
        self.image_size
    }
}

impl Dataset<ClockItem> for ClockDataset {
    fn get(&self, index: usize) -> Option<ClockItem> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Batch of clock images
#[derive(Clone, Debug)]
pub struct ClockBatch<B: Backend> {
    /// Images tensor of shape `[batch, 1, height, width]`
    pub images: Tensor<B, 4>,
    /// Hour labels of shape `[batch]`
    pub hours: Tensor<B, 1, Int>,
    /// Minute labels of shape `[batch]`
    pub minutes: Tensor<B, 1, Int>,
}

impl<B: Backend> ClockBatch<B> {
    /// Labels for one head
    pub fn labels(&self, unit: TimeUnit) -> Tensor<B, 1, Int> {
        match unit {
            TimeUnit::Hours => self.hours.clone(),
            TimeUnit::Minutes => self.minutes.clone(),
        }
    }

    /// Number of images in the batch
    pub fn len(&self) -> usize {
        self.images.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Batcher for creating clock batches
#[derive(Clone, Debug)]
pub struct ClockBatcher<B: Backend> {
    device: B::Device,
    image_size: [usize; 2],
}

impl<B: Backend> ClockBatcher<B> {
    /// Create a new batcher for the given device and image size
    pub fn new(device: B::Device, image_size: [usize; 2]) -> Self {
        Self { device, image_size }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }
}

impl<B: Backend> Batcher<ClockItem, ClockBatch<B>> for ClockBatcher<B> {
    fn batch(&self, items: Vec<ClockItem>) -> ClockBatch<B> {
        let batch_size = items.len();
        let [height, width] = self.image_size;

        let mut pixels = Vec::with_capacity(batch_size * height * width);
        let mut hours = Vec::with_capacity(batch_size);
        let mut minutes = Vec::with_capacity(batch_size);

        for item in items {
            pixels.extend_from_slice(&item.image);
            hours.push(item.hour as i64);
            minutes.push(item.minute as i64);
        }

        let images = Tensor::<B, 4>::from_data(
            TensorData::new(pixels, [batch_size, 1, height, width]),
            &self.device,
        );
        let hours = Tensor::<B, 1, Int>::from_data(TensorData::new(hours, [batch_size]), &self.device);
        let minutes =
            Tensor::<B, 1, Int>::from_data(TensorData::new(minutes, [batch_size]), &self.device);

        ClockBatch {
            images,
            hours,
            minutes,
        }
    }
}

/// Producer of fixed-size batches
pub trait BatchSource<B: Backend> {
    /// Next batch; always `batch_size()` images
    fn next_batch(&mut self) -> Result<ClockBatch<B>>;

    /// Images per batch
    fn batch_size(&self) -> usize;
}

/// Cycles over a dataset in order, wrapping around at the end so every batch
/// is full.
pub struct DatasetBatchSource<B: Backend, D: Dataset<ClockItem>> {
    dataset: D,
    batcher: ClockBatcher<B>,
    batch_size: usize,
    cursor: usize,
}

impl<B: Backend, D: Dataset<ClockItem>> DatasetBatchSource<B, D> {
    pub fn new(dataset: D, batcher: ClockBatcher<B>, batch_size: usize) -> Result<Self> {
        if batch_size == 0 {
            return Err(ClockError::Config("batch_size must be greater than 0".to_string()));
        }
        if dataset.is_empty() {
            return Err(ClockError::EmptyBatch("dataset has no items".to_string()));
        }

        Ok(Self {
            dataset,
            batcher,
            batch_size,
            cursor: 0,
        })
    }

    /// Restart from the first item
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

impl<B: Backend, D: Dataset<ClockItem>> BatchSource<B> for DatasetBatchSource<B, D> {
    fn next_batch(&mut self) -> Result<ClockBatch<B>> {
        let len = self.dataset.len();
        let mut items = Vec::with_capacity(self.batch_size);

        for _ in 0..self.batch_size {
            let item = self.dataset.get(self.cursor).ok_or_else(|| {
                ClockError::EmptyBatch(format!("dataset item {} of {} is missing", self.cursor, len))
            })?;
            items.push(item);
            self.cursor = (self.cursor + 1) % len;
        }

        Ok(self.batcher.batch(items))
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    fn item(hour: usize, minute: usize) -> ClockItem {
        ClockItem::new(vec![hour as f32 / 12.0; 4], hour, minute).unwrap()
    }

    #[test]
    fn test_item_label_validation() {
        assert!(ClockItem::new(vec![0.0; 4], 11, 59).is_ok());
        assert!(matches!(
            ClockItem::new(vec![0.0; 4], 12, 0),
            Err(ClockError::InvalidLabel { ref unit, value: 12, .. }) if unit == "hour"
        ));
        assert!(matches!(
            ClockItem::new(vec![0.0; 4], 0, 60),
            Err(ClockError::InvalidLabel { ref unit, value: 60, .. }) if unit == "minute"
        ));
    }

    #[test]
    fn test_dataset_checks_pixel_count() {
        assert!(ClockDataset::new(vec![item(1, 2)], [2, 2]).is_ok());
        assert!(ClockDataset::new(vec![item(1, 2)], [3, 2]).is_err());
    }

    #[test]
    fn test_batcher_shapes_and_labels() {
        let batcher = ClockBatcher::<TestBackend>::new(Default::default(), [2, 2]);
        let batch = batcher.batch(vec![item(1, 2), item(3, 4), item(5, 6)]);

        assert_eq!(batch.images.dims(), [3, 1, 2, 2]);
        assert_eq!(batch.len(), 3);

        let hours: Vec<i64> = batch.labels(TimeUnit::Hours).into_data().to_vec().unwrap();
        let minutes: Vec<i64> = batch.labels(TimeUnit::Minutes).into_data().to_vec().unwrap();
        assert_eq!(hours, vec![1, 3, 5]);
        assert_eq!(minutes, vec![2, 4, 6]);
    }

    #[test]
    fn test_batch_source_wraps_around() {
        let dataset = ClockDataset::new(vec![item(0, 0), item(1, 1), item(2, 2)], [2, 2]).unwrap();
        let batcher = ClockBatcher::<TestBackend>::new(Default::default(), [2, 2]);
        let mut source = DatasetBatchSource::new(dataset, batcher, 2).unwrap();

        let first: Vec<i64> = source.next_batch().unwrap().hours.into_data().to_vec().unwrap();
        let second: Vec<i64> = source.next_batch().unwrap().hours.into_data().to_vec().unwrap();
        assert_eq!(first, vec![0, 1]);
        assert_eq!(second, vec![2, 0]);

        source.rewind();
        let again: Vec<i64> = source.next_batch().unwrap().hours.into_data().to_vec().unwrap();
        assert_eq!(again, vec![0, 1]);
    }

    #[test]
    fn test_batch_source_rejects_empty_dataset() {
        let dataset = ClockDataset::new(Vec::new(), [2, 2]).unwrap();
        let batcher = ClockBatcher::<TestBackend>::new(Default::default(), [2, 2]);
        assert!(DatasetBatchSource::new(dataset, batcher, 2).is_err());
    }
}
