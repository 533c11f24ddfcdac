//! Building blocks of the clock network.
//!
//! Layers hold their parameters as plain [`Param`] tensors declared through
//! the [`WeightStore`], so initial values and weight decay follow each
//! declaration site exactly.

use burn::{
    module::{Module, Param},
    tensor::{
        activation::relu,
        backend::Backend,
        module::{conv2d, max_pool2d},
        ops::ConvOptions,
        Tensor,
    },
};

use super::store::{ParamInit, WeightStore};
use crate::training::loss::LossCollection;
use crate::utils::error::{ClockError, Result};

/// Max pooling window (square)
pub const POOL_KERNEL: usize = 3;
/// Max pooling stride
pub const POOL_STRIDE: usize = 2;

/// Local response normalization over the channel axis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LrnParams {
    pub depth_radius: usize,
    pub bias: f64,
    pub alpha: f64,
    pub beta: f64,
}

/// The normalization used after both convolution stages
pub const CLOCK_LRN: LrnParams = LrnParams {
    depth_radius: 4,
    bias: 1.0,
    alpha: 0.001 / 9.0,
    beta: 0.75,
};

/// 2D convolution, stride 1, SAME padding, followed by bias add and ReLU
#[derive(Module, Debug)]
pub struct ConvLayer<B: Backend> {
    /// `[out_channels, in_channels, kernel, kernel]`
    pub weights: Param<Tensor<B, 4>>,
    pub biases: Param<Tensor<B, 1>>,
    weight_decay: Option<f64>,
}

impl<B: Backend> ConvLayer<B> {
    /// Declare `weights` and `biases` in the store's current scope
    pub fn new(
        store: &mut WeightStore<B>,
        channels: [usize; 2],
        kernel_size: usize,
        stddev: f64,
        weight_decay: Option<f64>,
        bias_init: f64,
    ) -> Result<Self> {
        if kernel_size % 2 == 0 {
            return Err(ClockError::Config(format!(
                "SAME convolution needs an odd kernel, got {}",
                kernel_size
            )));
        }

        let [in_channels, out_channels] = channels;
        let weights = store.weighted_variable(
            "weights",
            [out_channels, in_channels, kernel_size, kernel_size],
            stddev,
            weight_decay,
        )?;
        let biases = store.variable("biases", [out_channels], ParamInit::Constant(bias_init))?;

        Ok(Self {
            weights: weights.param,
            biases,
            weight_decay: weights.decay,
        })
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, kernel_h, kernel_w] = self.weights.val().dims();
        let options = ConvOptions::new([1, 1], [kernel_h / 2, kernel_w / 2], [1, 1], 1);

        relu(conv2d(x, self.weights.val(), Some(self.biases.val()), options))
    }

    pub fn regularization(&self, scope: &str, terms: &mut LossCollection<B>) {
        if let Some(decay) = self.weight_decay {
            terms.add_weight_decay(scope, self.weights.val(), decay);
        }
    }
}

/// Fully connected layer `x·W + b`
#[derive(Module, Debug)]
pub struct DenseLayer<B: Backend> {
    /// `[in_features, out_features]`
    pub weights: Param<Tensor<B, 2>>,
    pub biases: Param<Tensor<B, 1>>,
    weight_decay: Option<f64>,
}

impl<B: Backend> DenseLayer<B> {
    /// Declare `weights` and `biases` in the store's current scope
    pub fn new(
        store: &mut WeightStore<B>,
        features: [usize; 2],
        stddev: f64,
        weight_decay: Option<f64>,
        bias_init: f64,
    ) -> Result<Self> {
        let [in_features, out_features] = features;
        let weights =
            store.weighted_variable("weights", [in_features, out_features], stddev, weight_decay)?;
        let biases = store.variable("biases", [out_features], ParamInit::Constant(bias_init))?;

        Ok(Self {
            weights: weights.param,
            biases,
            weight_decay: weights.decay,
        })
    }

    pub fn in_features(&self) -> usize {
        self.weights.val().dims()[0]
    }

    pub fn out_features(&self) -> usize {
        self.weights.val().dims()[1]
    }

    /// Affine output without activation
    pub fn linear(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        x.matmul(self.weights.val()) + self.biases.val().unsqueeze()
    }

    /// Affine output followed by ReLU
    pub fn forward_relu(&self, x: Tensor<B, 2>) -> Tensor<B, 2> {
        relu(self.linear(x))
    }

    pub fn regularization(&self, scope: &str, terms: &mut LossCollection<B>) {
        if let Some(decay) = self.weight_decay {
            terms.add_weight_decay(scope, self.weights.val(), decay);
        }
    }
}

/// Output size and (before, after) padding of a SAME window along one axis.
///
/// The odd pixel of padding goes after the input, as TensorFlow does.
pub fn same_padding(input: usize, kernel: usize, stride: usize) -> (usize, usize, usize) {
    let output = input.div_ceil(stride);
    let needed = (output.saturating_sub(1) * stride + kernel).saturating_sub(input);
    let before = needed / 2;
    (output, before, needed - before)
}

fn zero_pad_axis<B: Backend>(x: Tensor<B, 4>, axis: usize, before: usize, after: usize) -> Tensor<B, 4> {
    if before == 0 && after == 0 {
        return x;
    }

    let device = x.device();
    let mut shape = x.dims();
    let mut parts = Vec::with_capacity(3);

    if before > 0 {
        shape[axis] = before;
        parts.push(Tensor::zeros(shape, &device));
    }
    parts.push(x);
    if after > 0 {
        shape[axis] = after;
        parts.push(Tensor::zeros(shape, &device));
    }

    Tensor::cat(parts, axis)
}

/// 3×3 max pooling with stride 2 and SAME padding.
///
/// Padding is filled with zeros, which only matches the usual `-inf` fill
/// because every pooled activation in this network is non-negative.
pub fn same_max_pool<B: Backend>(x: Tensor<B, 4>) -> Tensor<B, 4> {
    let [_, _, height, width] = x.dims();
    let (_, top, bottom) = same_padding(height, POOL_KERNEL, POOL_STRIDE);
    let (_, left, right) = same_padding(width, POOL_KERNEL, POOL_STRIDE);

    let x = zero_pad_axis(x, 2, top, bottom);
    let x = zero_pad_axis(x, 3, left, right);

    max_pool2d(
        x,
        [POOL_KERNEL, POOL_KERNEL],
        [POOL_STRIDE, POOL_STRIDE],
        [0, 0],
        [1, 1],
    )
}

/// `x / (bias + alpha * sum(x²over neighbouring channels))^beta`
pub fn local_response_norm<B: Backend>(x: Tensor<B, 4>, params: LrnParams) -> Tensor<B, 4> {
    let [batch, channels, height, width] = x.dims();
    let radius = params.depth_radius;

    let squared = zero_pad_axis(x.clone().powf_scalar(2.0), 1, radius, radius);

    let mut window_sum = squared.clone().slice([0..batch, 0..channels, 0..height, 0..width]);
    for offset in 1..=2 * radius {
        window_sum = window_sum
            + squared
                .clone()
                .slice([0..batch, offset..offset + channels, 0..height, 0..width]);
    }

    let scale = window_sum
        .mul_scalar(params.alpha)
        .add_scalar(params.bias)
        .powf_scalar(params.beta);

    x / scale
}
