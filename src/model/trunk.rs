//! Shared feature trunk: two convolution stages and two fully connected
//! layers mapping a grayscale clock image to a 192-dimensional feature vector.

use burn::{
    module::Module,
    tensor::{backend::Backend, Tensor},
};

use super::config::{ClockNetConfig, CONV_CHANNELS, CONV_KERNEL, FEATURE_DIM, LOCAL3_UNITS};
use super::layers::{local_response_norm, same_max_pool, ConvLayer, DenseLayer, CLOCK_LRN};
use super::store::WeightStore;
use crate::training::loss::LossCollection;
use crate::utils::error::{ClockError, Result};
use crate::utils::logging::activation_summary;

const CONV_STDDEV: f64 = 5e-2;
const CONV_WEIGHT_DECAY: Option<f64> = Some(0.0);
const LOCAL_STDDEV: f64 = 0.04;
const LOCAL_WEIGHT_DECAY: Option<f64> = Some(0.004);

/// conv1 → pool1 → norm1 → conv2 → norm2 → pool2 → local3 → local4
#[derive(Module, Debug)]
pub struct FeatureTrunk<B: Backend> {
    pub conv1: ConvLayer<B>,
    pub conv2: ConvLayer<B>,
    pub local3: DenseLayer<B>,
    pub local4: DenseLayer<B>,
    image_height: usize,
    image_width: usize,
}

impl<B: Backend> FeatureTrunk<B> {
    /// Declare every trunk parameter through `store`
    pub fn new(store: &mut WeightStore<B>, config: &ClockNetConfig) -> Result<Self> {
        config.validate()?;

        let conv1 = store.with_scope("conv1", |s| {
            ConvLayer::new(s, [1, CONV_CHANNELS], CONV_KERNEL, CONV_STDDEV, CONV_WEIGHT_DECAY, 0.0)
        })?;
        let conv2 = store.with_scope("conv2", |s| {
            ConvLayer::new(
                s,
                [CONV_CHANNELS, CONV_CHANNELS],
                CONV_KERNEL,
                CONV_STDDEV,
                CONV_WEIGHT_DECAY,
                0.1,
            )
        })?;
        let local3 = store.with_scope("local3", |s| {
            DenseLayer::new(
                s,
                [config.flattened_dim(), LOCAL3_UNITS],
                LOCAL_STDDEV,
                LOCAL_WEIGHT_DECAY,
                0.1,
            )
        })?;
        let local4 = store.with_scope("local4", |s| {
            DenseLayer::new(s, [LOCAL3_UNITS, FEATURE_DIM], LOCAL_STDDEV, LOCAL_WEIGHT_DECAY, 0.1)
        })?;

        Ok(Self {
            conv1,
            conv2,
            local3,
            local4,
            image_height: config.image_size1,
            image_width: config.image_size2,
        })
    }

    /// `[height, width]` the trunk was built for
    pub fn image_size(&self) -> [usize; 2] {
        [self.image_height, self.image_width]
    }

    /// Map `[batch, 1, height, width]` images to `[batch, 192]` features
    pub fn forward(&self, images: Tensor<B, 4>) -> Result<Tensor<B, 2>> {
        let [batch, channels, height, width] = images.dims();
        if channels != 1 || height != self.image_height || width != self.image_width {
            return Err(ClockError::ShapeMismatch {
                context: "clock images".to_string(),
                expected: vec![batch, 1, self.image_height, self.image_width],
                actual: vec![batch, channels, height, width],
            });
        }
        if batch == 0 {
            return Err(ClockError::EmptyBatch("clock images".to_string()));
        }

        let conv1 = self.conv1.forward(images);
        activation_summary("conv1", &conv1);
        let pool1 = same_max_pool(conv1);
        let norm1 = local_response_norm(pool1, CLOCK_LRN);

        let conv2 = self.conv2.forward(norm1);
        activation_summary("conv2", &conv2);
        let norm2 = local_response_norm(conv2, CLOCK_LRN);
        let pool2 = same_max_pool(norm2);

        // Move everything into depth so one matrix multiply covers the batch.
        let [_, depth, pooled_h, pooled_w] = pool2.dims();
        let flat = pool2.reshape([batch, depth * pooled_h * pooled_w]);

        let local3 = self.local3.forward_relu(flat);
        activation_summary("local3", &local3);
        let local4 = self.local4.forward_relu(local3);
        activation_summary("local4", &local4);

        Ok(local4)
    }

    /// Append the decay terms of all four weighted layers
    pub fn regularization(&self, terms: &mut LossCollection<B>) {
        self.conv1.regularization("conv1", terms);
        self.conv2.regularization("conv2", terms);
        self.local3.regularization("local3", terms);
        self.local4.regularization("local4", terms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::training::loss::LossKind;
    use burn_ndarray::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_trunk_output_is_192_wide_for_any_resolution() {
        let device = Default::default();

        for (h, w) in [(8, 8), (5, 7), (12, 4)] {
            let config = ClockNetConfig::new().with_image_size1(h).with_image_size2(w);
            let mut store = WeightStore::<TestBackend>::new(&device);
            let trunk = FeatureTrunk::new(&mut store, &config).unwrap();

            assert_eq!(trunk.local3.in_features(), config.flattened_dim());

            let features = trunk
                .forward(Tensor::ones([3, 1, h, w], &device))
                .unwrap();
            assert_eq!(features.dims(), [3, FEATURE_DIM]);
        }
    }

    #[test]
    fn test_trunk_declares_expected_parameters() {
        let device = Default::default();
        let config = ClockNetConfig::new().with_image_size1(8).with_image_size2(8);
        let mut store = WeightStore::<TestBackend>::new(&device);
        FeatureTrunk::new(&mut store, &config).unwrap();

        let names: Vec<&str> = store.declared().collect();
        assert_eq!(
            names,
            vec![
                "conv1/biases",
                "conv1/weights",
                "conv2/biases",
                "conv2/weights",
                "local3/biases",
                "local3/weights",
                "local4/biases",
                "local4/weights",
            ]
        );

        // A second trunk in the same store collides on every name.
        assert!(FeatureTrunk::new(&mut store, &config).is_err());
    }

    #[test]
    fn test_trunk_regularization_terms() {
        let device = Default::default();
        let config = ClockNetConfig::new().with_image_size1(4).with_image_size2(4);
        let mut store = WeightStore::<TestBackend>::new(&device);
        let trunk = FeatureTrunk::new(&mut store, &config).unwrap();

        let mut terms = LossCollection::new();
        trunk.regularization(&mut terms);

        let names: Vec<&str> = terms.terms().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["conv1/weight_loss", "conv2/weight_loss", "local3/weight_loss", "local4/weight_loss"]
        );
        assert_eq!(terms.count(LossKind::WeightDecay), 4);
    }

    #[test]
    fn test_trunk_rejects_wrong_input_shape() {
        let device = Default::default();
        let config = ClockNetConfig::new().with_image_size1(8).with_image_size2(8);
        let mut store = WeightStore::<TestBackend>::new(&device);
        let trunk = FeatureTrunk::new(&mut store, &config).unwrap();

        let err = trunk
            .forward(Tensor::ones([2, 1, 8, 9], &device))
            .unwrap_err();
        assert!(matches!(err, ClockError::ShapeMismatch { .. }));

        let err = trunk
            .forward(Tensor::ones([2, 3, 8, 8], &device))
            .unwrap_err();
        assert!(matches!(err, ClockError::ShapeMismatch { .. }));
    }
}
