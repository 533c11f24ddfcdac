//! Classification heads on top of the shared trunk
//!
//! `TimeReader` reads one unit (hours or minutes) with a single linear head.
//! `MultiTaskTimeReader` shares one trunk between two independent heads.

use burn::{
    module::{Ignored, Module},
    tensor::{activation::softmax, backend::Backend, Tensor},
};

use super::config::{ClockNetConfig, FEATURE_DIM};
use super::layers::DenseLayer;
use super::store::WeightStore;
use super::trunk::FeatureTrunk;
use crate::dataset::{ClockBatch, TimeUnit};
use crate::training::loss::{loss, loss_multitask, LossCollection, MultiTaskLoss, ScopedLoss};
use crate::utils::error::Result;

const HEAD_STDDEV: f64 = 1.0 / FEATURE_DIM as f64;
const HEAD_WEIGHT_DECAY: Option<f64> = Some(0.0);
const HEAD_BIAS: f64 = 0.0;

/// Scope of the single-task head
pub const SINGLE_HEAD_SCOPE: &str = "softmax_linear";

/// Scope of a multi-task head
pub fn multitask_head_scope(unit: TimeUnit) -> &'static str {
    match unit {
        TimeUnit::Hours => "softmax_linear_hours",
        TimeUnit::Minutes => "softmax_linear_minutes",
    }
}

fn time_head<B: Backend>(
    store: &mut WeightStore<B>,
    scope: &str,
    unit: TimeUnit,
) -> Result<DenseLayer<B>> {
    store.with_scope(scope, |s| {
        DenseLayer::new(
            s,
            [FEATURE_DIM, unit.num_classes()],
            HEAD_STDDEV,
            HEAD_WEIGHT_DECAY,
            HEAD_BIAS,
        )
    })
}

/// Anything the training and evaluation loops can drive
pub trait TimeModel<B: Backend> {
    /// Total training loss of one batch together with its terms
    fn objective(&self, batch: &ClockBatch<B>) -> Result<ScopedLoss<B>>;

    /// Units of every head, in head order
    fn heads(&self) -> Vec<TimeUnit>;

    /// Raw logits of every head, in head order
    fn head_logits(&self, images: Tensor<B, 4>) -> Result<Vec<(TimeUnit, Tensor<B, 2>)>>;
}

/// Trunk plus one linear head
#[derive(Module, Debug)]
pub struct TimeReader<B: Backend> {
    pub trunk: FeatureTrunk<B>,
    pub head: DenseLayer<B>,
    unit: Ignored<TimeUnit>,
}

impl<B: Backend> TimeReader<B> {
    pub fn new(store: &mut WeightStore<B>, config: &ClockNetConfig, unit: TimeUnit) -> Result<Self> {
        let trunk = FeatureTrunk::new(store, config)?;
        let head = time_head(store, SINGLE_HEAD_SCOPE, unit)?;

        Ok(Self {
            trunk,
            head,
            unit: Ignored(unit),
        })
    }

    pub fn unit(&self) -> TimeUnit {
        self.unit.0
    }

    /// `[batch, num_classes]` logits
    pub fn forward(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        let features = self.trunk.forward(images)?;
        Ok(self.head.linear(features))
    }

    pub fn forward_softmax(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        Ok(softmax(self.forward(images)?, 1))
    }
}

impl<B: Backend> TimeModel<B> for TimeReader<B> {
    fn objective(&self, batch: &ClockBatch<B>) -> Result<ScopedLoss<B>> {
        let logits = self.forward(batch.images.clone())?;

        let mut regularization = LossCollection::new();
        self.trunk.regularization(&mut regularization);
        self.head.regularization(SINGLE_HEAD_SCOPE, &mut regularization);

        loss(self.unit().scope(), logits, batch.labels(self.unit()), regularization)
    }

    fn heads(&self) -> Vec<TimeUnit> {
        vec![self.unit()]
    }

    fn head_logits(&self, images: Tensor<B, 4>) -> Result<Vec<(TimeUnit, Tensor<B, 2>)>> {
        Ok(vec![(self.unit(), self.forward(images)?)])
    }
}

/// Trunk shared by an hours head and a minutes head
#[derive(Module, Debug)]
pub struct MultiTaskTimeReader<B: Backend> {
    pub trunk: FeatureTrunk<B>,
    pub hours: DenseLayer<B>,
    pub minutes: DenseLayer<B>,
}

impl<B: Backend> MultiTaskTimeReader<B> {
    pub fn new(store: &mut WeightStore<B>, config: &ClockNetConfig) -> Result<Self> {
        let trunk = FeatureTrunk::new(store, config)?;
        let hours = time_head(store, multitask_head_scope(TimeUnit::Hours), TimeUnit::Hours)?;
        let minutes = time_head(store, multitask_head_scope(TimeUnit::Minutes), TimeUnit::Minutes)?;

        Ok(Self {
            trunk,
            hours,
            minutes,
        })
    }

    /// `([batch, 12], [batch, 60])` logits
    pub fn forward(&self, images: Tensor<B, 4>) -> Result<(Tensor<B, 2>, Tensor<B, 2>)> {
        let features = self.trunk.forward(images)?;
        Ok((self.hours.linear(features.clone()), self.minutes.linear(features)))
    }

    pub fn forward_softmax(&self, images: Tensor<B, 4>) -> Result<(Tensor<B, 2>, Tensor<B, 2>)> {
        let (hours, minutes) = self.forward(images)?;
        Ok((softmax(hours, 1), softmax(minutes, 1)))
    }

    /// Hours, minutes and shared scopes kept apart
    pub fn objective_multitask(&self, batch: &ClockBatch<B>) -> Result<MultiTaskLoss<B>> {
        let (logits_hours, logits_minutes) = self.forward(batch.images.clone())?;

        let mut shared = LossCollection::new();
        self.trunk.regularization(&mut shared);

        let mut hours_regularization = LossCollection::new();
        self.hours
            .regularization(multitask_head_scope(TimeUnit::Hours), &mut hours_regularization);

        let mut minutes_regularization = LossCollection::new();
        self.minutes
            .regularization(multitask_head_scope(TimeUnit::Minutes), &mut minutes_regularization);

        loss_multitask(
            logits_hours,
            batch.hours.clone(),
            hours_regularization,
            logits_minutes,
            batch.minutes.clone(),
            minutes_regularization,
            shared,
        )
    }
}

impl<B: Backend> TimeModel<B> for MultiTaskTimeReader<B> {
    fn objective(&self, batch: &ClockBatch<B>) -> Result<ScopedLoss<B>> {
        Ok(self.objective_multitask(batch)?.into())
    }

    fn heads(&self) -> Vec<TimeUnit> {
        vec![TimeUnit::Hours, TimeUnit::Minutes]
    }

    fn head_logits(&self, images: Tensor<B, 4>) -> Result<Vec<(TimeUnit, Tensor<B, 2>)>> {
        let (hours, minutes) = self.forward(images)?;
        Ok(vec![(TimeUnit::Hours, hours), (TimeUnit::Minutes, minutes)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ClockBatcher, ClockItem};
    use crate::training::loss::LossKind;
    use burn::data::dataloader::batcher::Batcher;
    use burn::tensor::ElementConversion;
    use burn_ndarray::NdArray;
    use std::collections::HashSet;

    type TestBackend = NdArray;

    fn config() -> ClockNetConfig {
        ClockNetConfig::new().with_image_size1(4).with_image_size2(4)
    }

    fn batch() -> ClockBatch<TestBackend> {
        let items = vec![
            ClockItem::new(vec![0.2; 16], 3, 15).unwrap(),
            ClockItem::new(vec![0.7; 16], 9, 58).unwrap(),
        ];
        ClockBatcher::new(Default::default(), [4, 4]).batch(items)
    }

    fn scalar(t: Tensor<TestBackend, 1>) -> f64 {
        t.into_scalar().elem()
    }

    #[test]
    fn test_single_task_shapes() {
        let device = Default::default();
        for unit in [TimeUnit::Hours, TimeUnit::Minutes] {
            let mut store = WeightStore::<TestBackend>::new(&device);
            let reader = TimeReader::new(&mut store, &config(), unit).unwrap();

            let logits = reader.forward(batch().images).unwrap();
            assert_eq!(logits.dims(), [2, unit.num_classes()]);

            let probs = reader.forward_softmax(batch().images).unwrap();
            let sums: Vec<f32> = probs.sum_dim(1).into_data().to_vec().unwrap();
            assert!(sums.iter().all(|s| (s - 1.0).abs() < 1e-5));
        }
    }

    #[test]
    fn test_single_task_objective_terms() {
        let device = Default::default();
        let mut store = WeightStore::<TestBackend>::new(&device);
        let reader = TimeReader::new(&mut store, &config(), TimeUnit::Minutes).unwrap();

        let objective = reader.objective(&batch()).unwrap();
        assert_eq!(objective.terms.count(LossKind::WeightDecay), 5);
        assert_eq!(objective.terms.count(LossKind::CrossEntropy), 1);
        assert_eq!(
            objective.terms.terms().last().unwrap().name,
            "minutes/cross_entropy"
        );

        let summed = scalar(objective.terms.total(&device));
        assert!((scalar(objective.total) - summed).abs() < 1e-6);
    }

    #[test]
    fn test_multitask_heads_are_independent() {
        let device = Default::default();
        let mut store = WeightStore::<TestBackend>::new(&device);
        let reader = MultiTaskTimeReader::new(&mut store, &config()).unwrap();

        let (hours, minutes) = reader.forward(batch().images).unwrap();
        assert_eq!(hours.dims(), [2, 12]);
        assert_eq!(minutes.dims(), [2, 60]);

        let declared: HashSet<&str> = store.declared().collect();
        assert!(declared.contains("softmax_linear_hours/weights"));
        assert!(declared.contains("softmax_linear_minutes/weights"));
        assert_eq!(declared.len(), 12);
    }

    #[test]
    fn test_multitask_objective_counts_every_decay_once() {
        let device = Default::default();
        let mut store = WeightStore::<TestBackend>::new(&device);
        let reader = MultiTaskTimeReader::new(&mut store, &config()).unwrap();
        let declared: HashSet<String> = store.declared().map(str::to_string).collect();

        let multi = reader.objective_multitask(&batch()).unwrap();
        assert_eq!(multi.shared.len(), 4);
        assert_eq!(multi.hours.terms.count(LossKind::WeightDecay), 1);
        assert_eq!(multi.minutes.terms.count(LossKind::WeightDecay), 1);

        let combined = scalar(multi.total.clone());
        let expected = scalar(multi.hours.total.clone())
            + scalar(multi.minutes.total.clone())
            + scalar(multi.shared.total(&device));
        assert!((combined - expected).abs() < 1e-5);

        let flat: ScopedLoss<TestBackend> = multi.into();
        let decay_names: Vec<&str> = flat
            .terms
            .terms()
            .iter()
            .filter(|t| t.kind == LossKind::WeightDecay)
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(decay_names.len(), 6);

        let unique: HashSet<&str> = decay_names.iter().copied().collect();
        assert_eq!(unique.len(), decay_names.len());

        for name in decay_names {
            let scope = name.trim_end_matches("/weight_loss");
            assert!(declared.contains(&format!("{}/weights", scope)), "{}", name);
        }

        assert!((scalar(flat.terms.total(&device)) - combined).abs() < 1e-5);
    }

    #[test]
    fn test_head_logits_order() {
        let device = Default::default();
        let mut store = WeightStore::<TestBackend>::new(&device);
        let reader = MultiTaskTimeReader::new(&mut store, &config()).unwrap();

        let heads = reader.head_logits(batch().images).unwrap();
        let units: Vec<TimeUnit> = heads.iter().map(|(u, _)| *u).collect();
        assert_eq!(units, vec![TimeUnit::Hours, TimeUnit::Minutes]);
        assert_eq!(reader.heads(), units);
    }
}
