//! Weight Store
//!
//! Explicit construction context for learnable parameters. Every layer of the
//! clock network declares its weights through a [`WeightStore`], which
//! qualifies names with the active scope (`conv1/weights`) and refuses to
//! declare the same qualified name twice. Sharing a parameter between two
//! computations is done by passing the owning module around, never by
//! re-declaring a name.

use std::collections::BTreeSet;

use burn::{
    module::Param,
    tensor::{backend::Backend, Distribution, ElementConversion, Tensor},
};
use tracing::debug;

use crate::utils::error::{ClockError, Result};

/// Values outside this many standard deviations are resampled.
pub const TRUNCATION_STDDEVS: f64 = 2.0;

/// Resampling rounds before the remaining outliers are clamped.
const MAX_RESAMPLE_ROUNDS: usize = 32;

/// How a parameter's initial value is produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamInit {
    /// Every element set to the same value
    Constant(f64),
    /// Zero-mean normal, truncated at two standard deviations
    TruncatedNormal { stddev: f64 },
}

impl ParamInit {
    fn sample<B: Backend, const D: usize>(
        &self,
        name: &str,
        shape: [usize; D],
        device: &B::Device,
    ) -> Result<Tensor<B, D>> {
        match *self {
            ParamInit::Constant(value) => {
                if !value.is_finite() {
                    return Err(ClockError::InvalidInitializer {
                        name: name.to_string(),
                        reason: format!("constant {} is not finite", value),
                    });
                }
                Ok(Tensor::full(shape, value, device))
            }
            ParamInit::TruncatedNormal { stddev } => {
                if !stddev.is_finite() || stddev <= 0.0 {
                    return Err(ClockError::InvalidInitializer {
                        name: name.to_string(),
                        reason: format!("stddev {} must be positive and finite", stddev),
                    });
                }
                Ok(truncated_normal(shape, stddev, device))
            }
        }
    }
}

/// A freshly declared weight together with its L2 decay coefficient.
///
/// `decay: None` means the weight contributes no regularization term at all;
/// `Some(0.0)` still contributes a (zero-valued) term.
#[derive(Debug)]
pub struct DecayedParam<B: Backend, const D: usize> {
    pub param: Param<Tensor<B, D>>,
    pub decay: Option<f64>,
}

/// Construction context for the parameters of one model
#[derive(Debug)]
pub struct WeightStore<B: Backend> {
    device: B::Device,
    scopes: Vec<String>,
    declared: BTreeSet<String>,
}

impl<B: Backend> WeightStore<B> {
    /// Create a store whose parameters all live on `device`
    pub fn new(device: &B::Device) -> Self {
        Self {
            device: device.clone(),
            scopes: Vec::new(),
            declared: BTreeSet::new(),
        }
    }

    /// Device holding every parameter declared through this store
    pub fn device(&self) -> &B::Device {
        &self.device
    }

    /// Run `build` with `scope` appended to the current scope path
    pub fn with_scope<R>(
        &mut self,
        scope: &str,
        build: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        self.scopes.push(scope.to_string());
        let result = build(self);
        self.scopes.pop();
        result
    }

    /// Current scope path, `/`-separated
    pub fn current_scope(&self) -> String {
        self.scopes.join("/")
    }

    fn qualify(&self, name: &str) -> String {
        if self.scopes.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", self.current_scope(), name)
        }
    }

    /// Declare a parameter with the given initializer
    pub fn variable<const D: usize>(
        &mut self,
        name: &str,
        shape: [usize; D],
        init: ParamInit,
    ) -> Result<Param<Tensor<B, D>>> {
        let qualified = self.qualify(name);
        if self.declared.contains(&qualified) {
            return Err(ClockError::DuplicateParameter(qualified));
        }

        let tensor = init.sample::<B, D>(&qualified, shape, &self.device)?;
        debug!(name = %qualified, ?shape, ?init, "declared parameter");
        self.declared.insert(qualified);

        Ok(Param::from_tensor(tensor))
    }

    /// Declare a truncated-normal weight with an optional L2 decay coefficient
    pub fn weighted_variable<const D: usize>(
        &mut self,
        name: &str,
        shape: [usize; D],
        stddev: f64,
        decay: Option<f64>,
    ) -> Result<DecayedParam<B, D>> {
        if let Some(decay) = decay {
            if !decay.is_finite() || decay < 0.0 {
                return Err(ClockError::Config(format!(
                    "weight decay for '{}' must be finite and non-negative, got {}",
                    self.qualify(name),
                    decay
                )));
            }
        }

        let param = self.variable(name, shape, ParamInit::TruncatedNormal { stddev })?;
        Ok(DecayedParam { param, decay })
    }

    /// Qualified names of every declared parameter, sorted
    pub fn declared(&self) -> impl Iterator<Item = &str> {
        self.declared.iter().map(String::as_str)
    }

    /// Number of declared parameter tensors
    pub fn len(&self) -> usize {
        self.declared.len()
    }

    /// True if nothing has been declared yet
    pub fn is_empty(&self) -> bool {
        self.declared.is_empty()
    }
}

/// Sample a zero-mean normal tensor with no value beyond two standard deviations
pub fn truncated_normal<B: Backend, const D: usize>(
    shape: [usize; D],
    stddev: f64,
    device: &B::Device,
) -> Tensor<B, D> {
    let bound = TRUNCATION_STDDEVS * stddev;
    let mut values = Tensor::<B, D>::random(shape, Distribution::Normal(0.0, stddev), device);

    for _ in 0..MAX_RESAMPLE_ROUNDS {
        let outside = values.clone().abs().greater_elem(bound);
        let remaining: i64 = outside.clone().int().sum().into_scalar().elem();
        if remaining == 0 {
            return values;
        }

        let fresh = Tensor::<B, D>::random(shape, Distribution::Normal(0.0, stddev), device);
        values = values.mask_where(outside, fresh);
    }

    values.clamp(-bound, bound)
}
