use ndarray::{Array1, ArrayD, ArrayViewD};
use serde::{Serialize, Deserialize};

use crate::config::NeuralNetConfiguration;
use crate::error::{LayerError, Result};
use crate::gradient::Gradient;
use crate::params::ParamTable;

/// Broad family a layer belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LayerType {
    FeedForward,
    Recurrent,
    Convolutional,
    Normalization,
}

/// Trait defining the interface for neural network layers
///
/// Arrays cross this boundary as `ArrayD<f32>`; each layer checks the
/// dimensionality it expects. Operations a layer has no meaningful
/// implementation for return [`LayerError::Unsupported`] by default.
pub trait Layer: Send + Sync {
    fn layer_type(&self) -> LayerType;

    /// Position of the layer in its model
    fn index(&self) -> usize;

    fn set_index(&mut self, index: usize);

    fn conf(&self) -> &NeuralNetConfiguration;

    fn set_conf(&mut self, conf: NeuralNetConfiguration);

    /// Most recent input, set by [`set_input`](Self::set_input) or [`activate`](Self::activate)
    fn input(&self) -> Option<&ArrayD<f32>>;

    fn set_input(&mut self, input: ArrayD<f32>);

    /// Leading dimension of the current input
    fn batch_size(&self) -> Result<usize> {
        self.input()
            .and_then(|input| input.shape().first().copied())
            .ok_or_else(|| LayerError::illegal_state("layer has no input"))
    }

    /// Forward pass
    fn activate(&mut self, input: ArrayViewD<f32>, training: bool) -> Result<ArrayD<f32>>;

    /// Forward pass over the stored input
    fn activate_cached(&mut self, training: bool) -> Result<ArrayD<f32>> {
        let input = self
            .input()
            .cloned()
            .ok_or_else(|| LayerError::illegal_state("layer has no input"))?;
        self.activate(input.view(), training)
    }

    fn pre_output(&mut self, input: ArrayViewD<f32>, training: bool) -> Result<ArrayD<f32>> {
        self.activate(input, training)
    }

    /// Pre-output without a training flag
    fn pre_output_default(&mut self, _input: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        Err(LayerError::unsupported("pre_output without training flag"))
    }

    /// Inference-mode forward pass
    fn transform(&mut self, data: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        self.activate(data, false)
    }

    /// Derivative of the configured activation evaluated at the training-mode output
    fn derivative_activation(&mut self, input: ArrayViewD<f32>) -> Result<ArrayD<f32>> {
        let output = self.activate(input, true)?;
        Ok(self.conf().activation.derivative(&output))
    }

    /// Backward pass: parameter gradients and the epsilon for the layer below
    fn backprop_gradient(&mut self, epsilon: ArrayViewD<f32>) -> Result<(Gradient, ArrayD<f32>)>;

    /// Apply a gradient to the parameters
    fn update(&mut self, gradient: &Gradient) -> Result<()>;

    /// Apply a gradient to a single named parameter
    fn update_param(&mut self, gradient: ArrayViewD<f32>, param: &str) -> Result<()>;

    fn param_table(&self) -> &ParamTable;

    fn set_param_table(&mut self, params: ParamTable);

    fn get_param(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.param_table().get(name)
    }

    fn set_param(&mut self, name: &str, value: ArrayD<f32>);

    /// All parameters flattened in table order
    fn params(&self) -> Array1<f32> {
        self.param_table().flattened()
    }

    fn num_params(&self) -> usize {
        self.param_table().num_params()
    }

    fn set_params(&mut self, _params: &Array1<f32>) -> Result<()> {
        Err(LayerError::unsupported("set_params"))
    }

    /// Fill the parameter table with the layer's initializer
    fn init_params(&mut self) -> Result<()>;

    fn l1_magnitude(&self) -> f32;

    fn l2_magnitude(&self) -> f32;

    fn score(&self) -> f32;

    fn fit(&mut self) -> Result<()>;

    fn compute_gradient_and_score(&mut self) -> Result<()>;

    fn accumulate_score(&mut self, accum: f32);

    fn validate_input(&self) -> Result<()>;

    /// Drop the input and every cached intermediate
    fn clear(&mut self);

    fn error(&self, _input: ArrayViewD<f32>) -> Result<Gradient> {
        Err(LayerError::unsupported("error"))
    }

    fn calc_gradient(&self, _layer_error: &Gradient, _activation: ArrayViewD<f32>) -> Result<Gradient> {
        Err(LayerError::unsupported("calc_gradient"))
    }

    fn error_signal(&self, _error: &Gradient, _input: ArrayViewD<f32>) -> Result<Gradient> {
        Err(LayerError::unsupported("error_signal"))
    }

    fn merge(&mut self, _other: &dyn Layer, _batch_size: usize) -> Result<()> {
        Err(LayerError::unsupported("merge"))
    }

    fn activation_mean(&self) -> Result<ArrayD<f32>> {
        Err(LayerError::unsupported("activation_mean"))
    }

    fn transpose(&self) -> Result<Box<dyn Layer>> {
        Err(LayerError::unsupported("transpose"))
    }

    /// Clone the layer into a boxed trait object
    fn try_clone_box(&self) -> Result<Box<dyn Layer>> {
        Err(LayerError::unsupported("clone"))
    }

    /// Fit on a single array
    fn fit_data(&mut self, _data: ArrayViewD<f32>) -> Result<()> {
        Err(LayerError::unsupported("fit on data"))
    }

    fn iterate(&mut self, _input: ArrayViewD<f32>) -> Result<()> {
        Err(LayerError::unsupported("iterate"))
    }

    fn gradient(&self) -> Result<Gradient> {
        Err(LayerError::unsupported("gradient"))
    }

    fn gradient_and_score(&self) -> Result<(Gradient, f32)> {
        Err(LayerError::unsupported("gradient_and_score"))
    }
}
