//! Loss Module
//!
//! Losses are assembled from an explicit [`LossCollection`] handed in by the
//! caller instead of an ambient, process-wide list. Each layer appends its
//! own weight-decay terms to the collection it is given, so the multi-task
//! objective can scope every term to exactly one owner:
//!
//! - hours scope: hours cross-entropy + hours head decay
//! - minutes scope: minutes cross-entropy + minutes head decay
//! - shared scope: trunk decay, counted once

use burn::{
    nn::loss::CrossEntropyLossConfig,
    tensor::{backend::Backend, Int, Tensor},
};

use crate::utils::error::{ClockError, Result};

/// What a loss term measures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossKind {
    /// `decay * l2_loss(weight)` for one declared weight
    WeightDecay,
    /// Batch-mean sparse softmax cross-entropy of one head
    CrossEntropy,
}

/// One named scalar contribution to a total loss
#[derive(Debug, Clone)]
pub struct LossTerm<B: Backend> {
    pub name: String,
    pub kind: LossKind,
    /// Shape `[1]`
    pub value: Tensor<B, 1>,
}

/// Ordered, explicitly owned set of loss terms
#[derive(Debug, Clone)]
pub struct LossCollection<B: Backend> {
    terms: Vec<LossTerm<B>>,
}

impl<B: Backend> Default for LossCollection<B> {
    fn default() -> Self {
        Self { terms: Vec::new() }
    }
}

impl<B: Backend> LossCollection<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, kind: LossKind, value: Tensor<B, 1>) {
        self.terms.push(LossTerm {
            name: name.into(),
            kind,
            value,
        });
    }

    /// Append `decay * l2_loss(weight)` tagged as `<scope>/weight_loss`
    pub fn add_weight_decay<const D: usize>(&mut self, scope: &str, weight: Tensor<B, D>, decay: f64) {
        let term = l2_loss(weight).mul_scalar(decay);
        self.push(format!("{}/weight_loss", scope), LossKind::WeightDecay, term);
    }

    /// Move every term of `other` to the end of this collection
    pub fn append(&mut self, other: LossCollection<B>) {
        self.terms.extend(other.terms);
    }

    pub fn terms(&self) -> &[LossTerm<B>] {
        &self.terms
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Number of terms of the given kind
    pub fn count(&self, kind: LossKind) -> usize {
        self.terms.iter().filter(|t| t.kind == kind).count()
    }

    /// Sum of every term, shape `[1]`; zero when empty
    pub fn total(&self, device: &B::Device) -> Tensor<B, 1> {
        self.terms
            .iter()
            .map(|t| t.value.clone())
            .reduce(|acc, v| acc + v)
            .unwrap_or_else(|| Tensor::zeros([1], device))
    }
}

/// Half the squared L2 norm, matching the usual weight-decay convention
pub fn l2_loss<B: Backend, const D: usize>(weight: Tensor<B, D>) -> Tensor<B, 1> {
    weight.powf_scalar(2.0).sum().div_scalar(2.0)
}

/// A total loss together with the terms it was summed from
#[derive(Debug, Clone)]
pub struct ScopedLoss<B: Backend> {
    pub terms: LossCollection<B>,
    /// Shape `[1]`
    pub total: Tensor<B, 1>,
}

/// Mean cross-entropy of one head plus the regularization scoped to it.
///
/// The cross-entropy term is appended to `regularization` (named
/// `<scope>/cross_entropy`) and the returned total is the sum of that whole
/// collection. Labels are read back to the host and must lie in
/// `[0, num_classes)`.
pub fn loss<B: Backend>(
    scope: &str,
    logits: Tensor<B, 2>,
    labels: Tensor<B, 1, Int>,
    regularization: LossCollection<B>,
) -> Result<ScopedLoss<B>> {
    let [batch_size, num_classes] = logits.dims();
    let [num_labels] = labels.dims();

    if batch_size == 0 {
        return Err(ClockError::EmptyBatch(format!("{} cross-entropy", scope)));
    }
    if num_labels != batch_size {
        return Err(ClockError::ShapeMismatch {
            context: format!("{} labels", scope),
            expected: vec![batch_size],
            actual: vec![num_labels],
        });
    }

    let values = labels
        .clone()
        .into_data()
        .convert::<i64>()
        .to_vec::<i64>()
        .map_err(|e| ClockError::TensorData(format!("{:?}", e)))?;
    if let Some(&value) = values
        .iter()
        .find(|&&v| v < 0 || v as usize >= num_classes)
    {
        return Err(ClockError::InvalidLabel {
            unit: scope.to_string(),
            value,
            num_classes,
        });
    }

    let device = logits.device();
    let cross_entropy = CrossEntropyLossConfig::new()
        .init(&device)
        .forward(logits, labels);

    let mut terms = regularization;
    terms.push(
        format!("{}/cross_entropy", scope),
        LossKind::CrossEntropy,
        cross_entropy,
    );
    let total = terms.total(&device);

    Ok(ScopedLoss { terms, total })
}

/// Combined objective of the hours and minutes heads.
///
/// Trunk decay lives in `shared`, outside both head scopes, so `hours.total`
/// and `minutes.total` each hold only their head's cross-entropy and decay.
/// Neither is a complete single-task loss; `total` adds `shared` exactly once.
#[derive(Debug, Clone)]
pub struct MultiTaskLoss<B: Backend> {
    pub hours: ScopedLoss<B>,
    pub minutes: ScopedLoss<B>,
    /// Regularization owned by the shared trunk
    pub shared: LossCollection<B>,
    /// `hours.total + minutes.total + sum(shared)`
    pub total: Tensor<B, 1>,
}

/// Sum the independently scoped hours and minutes losses and the trunk decay
#[allow(clippy::too_many_arguments)]
pub fn loss_multitask<B: Backend>(
    logits_hours: Tensor<B, 2>,
    labels_hours: Tensor<B, 1, Int>,
    hours_regularization: LossCollection<B>,
    logits_minutes: Tensor<B, 2>,
    labels_minutes: Tensor<B, 1, Int>,
    minutes_regularization: LossCollection<B>,
    shared: LossCollection<B>,
) -> Result<MultiTaskLoss<B>> {
    let device = logits_hours.device();
    let hours = loss("hours", logits_hours, labels_hours, hours_regularization)?;
    let minutes = loss("minutes", logits_minutes, labels_minutes, minutes_regularization)?;

    let total = hours.total.clone() + minutes.total.clone() + shared.total(&device);

    Ok(MultiTaskLoss {
        hours,
        minutes,
        shared,
        total,
    })
}

impl<B: Backend> From<MultiTaskLoss<B>> for ScopedLoss<B> {
    fn from(multi: MultiTaskLoss<B>) -> Self {
        let mut terms = multi.shared;
        terms.append(multi.hours.terms);
        terms.append(multi.minutes.terms);

        ScopedLoss {
            terms,
            total: multi.total,
        }
    }
}
