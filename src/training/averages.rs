//! Exponential moving averages of losses and trainable parameters.

use std::collections::{BTreeMap, HashMap};

use burn::{
    module::{Module, ModuleMapper, ModuleVisitor, ParamId},
    tensor::{backend::Backend, Tensor},
};

/// Key under which the total loss is averaged
pub const TOTAL_LOSS_KEY: &str = "total_loss";

/// Smoothed loss values keyed by term name
#[derive(Debug, Clone)]
pub struct LossAverages {
    decay: f64,
    averages: BTreeMap<String, f64>,
}

impl LossAverages {
    pub fn new(decay: f64) -> Self {
        Self {
            decay,
            averages: BTreeMap::new(),
        }
    }

    /// Fold `value` into the average of `name`; the first value seeds it
    pub fn update(&mut self, name: &str, value: f64) -> f64 {
        let decay = self.decay;
        let average = self
            .averages
            .entry(name.to_string())
            .and_modify(|avg| *avg = decay * *avg + (1.0 - decay) * value)
            .or_insert(value);
        *average
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.averages.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.averages.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn decay(&self) -> f64 {
        self.decay
    }
}

/// Shadow copies of every float parameter of a module
#[derive(Debug, Clone)]
pub struct ParameterAverages<B: Backend> {
    decay: f64,
    shadows: HashMap<ParamId, Tensor<B, 1>>,
}

impl<B: Backend> ParameterAverages<B> {
    /// Start every shadow at the module's current value
    pub fn new<M: Module<B>>(module: &M, decay: f64) -> Self {
        let mut averages = Self {
            decay,
            shadows: HashMap::new(),
        };
        module.visit(&mut ShadowUpdater {
            shadows: &mut averages.shadows,
            decay: 0.0,
        });
        averages
    }

    /// Effective decay after `num_updates` optimizer steps
    pub fn decay_for(&self, num_updates: usize) -> f64 {
        let n = num_updates as f64;
        self.decay.min((1.0 + n) / (10.0 + n))
    }

    /// Move every shadow towards the module's current value
    pub fn update<M: Module<B>>(&mut self, module: &M, num_updates: usize) {
        let decay = self.decay_for(num_updates);
        module.visit(&mut ShadowUpdater {
            shadows: &mut self.shadows,
            decay,
        });
    }

    /// Copy of `module` with every tracked parameter replaced by its shadow
    pub fn averaged<M: Module<B>>(&self, module: M) -> M {
        module.map(&mut ShadowSwap {
            shadows: &self.shadows,
        })
    }

    pub fn len(&self) -> usize {
        self.shadows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shadows.is_empty()
    }
}

struct ShadowUpdater<'a, B: Backend> {
    shadows: &'a mut HashMap<ParamId, Tensor<B, 1>>,
    decay: f64,
}

impl<B: Backend> ModuleVisitor<B> for ShadowUpdater<'_, B> {
    fn visit_float<const D: usize>(&mut self, id: ParamId, tensor: &Tensor<B, D>) {
        let numel = tensor.shape().num_elements();
        let value = tensor.clone().reshape([numel]);

        let next = match self.shadows.remove(&id) {
            Some(shadow) => shadow.mul_scalar(self.decay) + value.mul_scalar(1.0 - self.decay),
            None => value,
        };
        self.shadows.insert(id, next);
    }
}

struct ShadowSwap<'a, B: Backend> {
    shadows: &'a HashMap<ParamId, Tensor<B, 1>>,
}

impl<B: Backend> ModuleMapper<B> for ShadowSwap<'_, B> {
    fn map_float<const D: usize>(&mut self, id: ParamId, tensor: Tensor<B, D>) -> Tensor<B, D> {
        match self.shadows.get(&id) {
            Some(shadow) => shadow.clone().reshape(tensor.dims()),
            None => tensor,
        }
    }
}
