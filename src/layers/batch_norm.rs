use ndarray::{Array1, Array2, ArrayD, ArrayViewD, Axis, Ix1, Ix2, Ix4};

use super::traits::{Layer, LayerType};
use crate::config::{LayerKind, NeuralNetConfiguration};
use crate::debug::numerical_check::{self, NumericalIssue};
use crate::error::{LayerError, Result};
use crate::gradient::Gradient;
use crate::params::{BatchNormParamInitializer, ParamInitializer, ParamTable};

/// Values the forward pass keeps for the backward pass
#[derive(Clone, Debug)]
struct NormCache {
    normalized: Array2<f32>,
    std: Array1<f32>,
    batch_statistics: bool,
    /// Shape of the original input when it was 4-D
    spatial_shape: Option<(usize, usize, usize, usize)>,
}

/// Batch Normalization Layer
///
/// Normalizes the inputs across the batch dimension to have mean 0 and variance 1,
/// then scales and shifts using the `gamma` and `beta` entries of its parameter
/// table. Dense input is `[batch, features]`; convolutional input
/// `[batch, channels, height, width]` is normalized per channel.
#[derive(Clone)]
pub struct BatchNormalizationLayer {
    conf: NeuralNetConfiguration,
    index: usize,
    input: Option<ArrayD<f32>>,
    params: ParamTable,
    initializer: BatchNormParamInitializer,

    /// Running mean for inference
    pub running_mean: Array1<f32>,

    /// Running variance for inference
    pub running_var: Array1<f32>,

    cache: Option<NormCache>,
}

impl BatchNormalizationLayer {
    /// Create a layer for a batch normalization configuration. Parameters
    /// stay empty until [`init_params`](Layer::init_params) runs.
    pub fn new(conf: NeuralNetConfiguration) -> Result<Self> {
        let (n_out, _, _) = Self::settings(&conf)?;

        Ok(BatchNormalizationLayer {
            conf,
            index: 0,
            input: None,
            params: ParamTable::new(),
            initializer: BatchNormParamInitializer::new(),
            running_mean: Array1::zeros(n_out),
            running_var: Array1::ones(n_out),
            cache: None,
        })
    }

    /// `(n_out, eps, decay)` from the configuration
    fn settings(conf: &NeuralNetConfiguration) -> Result<(usize, f32, f32)> {
        match conf.layer {
            LayerKind::BatchNormalization { n_out, eps, decay, .. } => Ok((n_out, eps, decay)),
            ref other => Err(LayerError::invalid_parameter(
                "layer".to_string(),
                format!("expected a batch normalization layer, got {:?}", other),
            )),
        }
    }

    /// Parameter `name` as a vector of `n_out` entries
    fn vector_param(&self, name: &str, n_out: usize) -> Result<Array1<f32>> {
        let param = self.params.require(name)?;
        if param.shape() != [n_out] {
            return Err(LayerError::dimension_mismatch(
                format!("{} of shape [{}]", name, n_out),
                format!("{:?}", param.shape()),
            ));
        }
        Ok(param.clone().into_dimensionality::<Ix1>()?)
    }

    /// Flatten input to `[rows, features]`
    fn to_rows(input: ArrayViewD<f32>) -> Result<(Array2<f32>, Option<(usize, usize, usize, usize)>)> {
        match input.ndim() {
            2 => Ok((input.into_dimensionality::<Ix2>()?.to_owned(), None)),
            4 => {
                let x = input.into_dimensionality::<Ix4>()?;
                let (n, c, h, w) = x.dim();
                let rows = x
                    .permuted_axes([0, 2, 3, 1])
                    .as_standard_layout()
                    .into_owned()
                    .into_shape((n * h * w, c))?;
                Ok((rows, Some((n, c, h, w))))
            }
            _ => Err(LayerError::dimension_mismatch(
                "[batch, features] or [batch, channels, height, width]".to_string(),
                format!("{:?}", input.shape()),
            )),
        }
    }

    /// Inverse of [`to_rows`](Self::to_rows)
    fn from_rows(rows: Array2<f32>, spatial_shape: Option<(usize, usize, usize, usize)>) -> Result<ArrayD<f32>> {
        match spatial_shape {
            None => Ok(rows.into_dyn()),
            Some((n, c, h, w)) => Ok(rows
                .as_standard_layout()
                .into_owned()
                .into_shape((n, h, w, c))?
                .permuted_axes([0, 3, 1, 2])
                .as_standard_layout()
                .into_owned()
                .into_dyn()),
        }
    }

    /// Forward pass for batch normalization
    fn batch_norm_forward(&mut self, inputs: Array2<f32>, training: bool) -> Result<Array2<f32>> {
        let (n_out, eps, decay) = Self::settings(&self.conf)?;
        let gamma = self.vector_param(BatchNormParamInitializer::GAMMA, n_out)?;
        let beta = self.vector_param(BatchNormParamInitializer::BETA, n_out)?;
        if self.running_mean.len() != n_out || self.running_var.len() != n_out {
            return Err(LayerError::dimension_mismatch(
                format!("running statistics of length {}", n_out),
                format!("{} and {}", self.running_mean.len(), self.running_var.len()),
            ));
        }

        let (rows, features) = inputs.dim();
        if features != n_out {
            return Err(LayerError::dimension_mismatch(
                format!("{} features", n_out),
                format!("{} features", features),
            ));
        }

        let batch_statistics = training && rows > 1;
        let (normalized, std) = if batch_statistics {
            // Training mode: use batch statistics
            let mean = inputs
                .mean_axis(Axis(0))
                .ok_or_else(|| LayerError::NumericalError("mean of an empty batch".to_string()))?;
            let var = inputs.var_axis(Axis(0), 0.0);
            let std = var.mapv(|v| (v + eps).sqrt());
            let normalized = (&inputs - &mean) / &std;

            // Update running statistics
            self.running_mean = &self.running_mean * decay + &mean * (1.0 - decay);
            self.running_var = &self.running_var * decay + &var * (1.0 - decay);

            (normalized, std)
        } else {
            // Inference mode: use running statistics
            let std = self.running_var.mapv(|v| (v + eps).sqrt());
            let normalized = (&inputs - &self.running_mean) / &std;
            (normalized, std)
        };

        // Scale and shift
        let output = &normalized * &gamma + &beta;

        self.cache = Some(NormCache {
            normalized,
            std,
            batch_statistics,
            spatial_shape: None,
        });

        Ok(output)
    }

    /// Backward pass for batch normalization: (input, gamma, beta) gradients
    fn batch_norm_backward(&self, grad_output: Array2<f32>) -> Result<(Array2<f32>, Array1<f32>, Array1<f32>)> {
        let cache = self
            .cache
            .as_ref()
            .ok_or_else(|| LayerError::illegal_state("backprop_gradient called before activate"))?;
        if grad_output.dim() != cache.normalized.dim() {
            return Err(LayerError::dimension_mismatch(
                format!("{:?}", cache.normalized.dim()),
                format!("{:?}", grad_output.dim()),
            ));
        }
        let gamma = self.vector_param(BatchNormParamInitializer::GAMMA, cache.std.len())?;

        let grad_gamma = (&grad_output * &cache.normalized).sum_axis(Axis(0));
        let grad_beta = grad_output.sum_axis(Axis(0));
        let grad_normalized = &grad_output * &gamma;

        let grad_input = if cache.batch_statistics {
            let rows = grad_output.nrows() as f32;
            let sum_grad = grad_normalized.sum_axis(Axis(0));
            let sum_grad_norm = (&grad_normalized * &cache.normalized).sum_axis(Axis(0));
            let centered = &grad_normalized * rows - &sum_grad - &cache.normalized * &sum_grad_norm;
            centered / &(&cache.std * rows)
        } else {
            // Running statistics are constants with respect to the input
            grad_normalized / &cache.std
        };

        Ok((grad_input, grad_gamma, grad_beta))
    }

    fn apply_update(&mut self, name: &str, gradient: &ArrayD<f32>) -> Result<()> {
        let learning_rate = self.conf.learning_rate;
        let param = self
            .params
            .get_mut(name)
            .ok_or_else(|| LayerError::MissingParameter(name.to_string()))?;
        if param.shape() != gradient.shape() {
            return Err(LayerError::dimension_mismatch(
                format!("{:?}", param.shape()),
                format!("{:?}", gradient.shape()),
            ));
        }
        param.scaled_add(-learning_rate, gradient);
        Ok(())
    }
}

impl Layer for BatchNormalizationLayer {
    fn layer_type(&self) -> LayerType {
        LayerType::Normalization
    }

    fn index(&self) -> usize {
        self.index
    }

    fn set_index(&mut self, index: usize) {
        self.index = index;
    }

    fn conf(&self) -> &NeuralNetConfiguration {
        &self.conf
    }

    /// Running statistics restart when the feature count changes
    fn set_conf(&mut self, conf: NeuralNetConfiguration) {
        if let Ok((n_out, _, _)) = Self::settings(&conf) {
            if n_out != self.running_mean.len() {
                self.running_mean = Array1::zeros(n_out);
                self.running_var = Array1::ones(n_out);
            }
        }
        self.conf = conf;
        self.cache = None;
    }

    fn input(&self) -> Option<&ArrayD<f32>> {
        self.input.as_ref()
    }

    fn set_input(&mut self, input: ArrayD<f32>) {
        self.input = Some(input);
    }

    fn activate(&mut self, input: ArrayViewD<f32>, training: bool) -> Result<ArrayD<f32>> {
        self.input = Some(input.to_owned());
        let (rows, spatial_shape) = Self::to_rows(input)?;
        let output = self.batch_norm_forward(rows, training)?;
        if let Some(cache) = self.cache.as_mut() {
            cache.spatial_shape = spatial_shape;
        }
        Self::from_rows(output, spatial_shape)
    }

    fn backprop_gradient(&mut self, epsilon: ArrayViewD<f32>) -> Result<(Gradient, ArrayD<f32>)> {
        let spatial_shape = self.cache.as_ref().and_then(|c| c.spatial_shape);
        let (grad_rows, _) = Self::to_rows(epsilon)?;
        let (grad_input, grad_gamma, grad_beta) = self.batch_norm_backward(grad_rows)?;

        let mut gradient = Gradient::new();
        gradient.set(BatchNormParamInitializer::GAMMA, Some(grad_gamma.into_dyn()));
        gradient.set(BatchNormParamInitializer::BETA, Some(grad_beta.into_dyn()));

        Ok((gradient, Self::from_rows(grad_input, spatial_shape)?))
    }

    /// Plain gradient descent step on gamma and beta
    fn update(&mut self, gradient: &Gradient) -> Result<()> {
        let issues = numerical_check::check_gradient(gradient);
        if issues
            .iter()
            .any(|issue| matches!(issue, NumericalIssue::NaN { .. } | NumericalIssue::Infinity { .. }))
        {
            return Err(LayerError::NumericalError(format!(
                "refusing to apply non-finite gradient: {:?}",
                issues
            )));
        }
        for name in [BatchNormParamInitializer::GAMMA, BatchNormParamInitializer::BETA] {
            if let Some(grad) = gradient.get(name) {
                self.apply_update(name, grad)?;
            }
        }
        Ok(())
    }

    fn update_param(&mut self, gradient: ArrayViewD<f32>, param: &str) -> Result<()> {
        self.apply_update(param, &gradient.to_owned())
    }

    fn param_table(&self) -> &ParamTable {
        &self.params
    }

    fn set_param_table(&mut self, params: ParamTable) {
        self.params = params;
    }

    fn set_param(&mut self, name: &str, value: ArrayD<f32>) {
        self.params.insert(name, value);
    }

    fn set_params(&mut self, params: &Array1<f32>) -> Result<()> {
        self.params.set_flattened(params)
    }

    fn init_params(&mut self) -> Result<()> {
        self.initializer.init(&mut self.params, &mut self.conf)
    }

    fn l1_magnitude(&self) -> f32 {
        self.params.iter().map(|(_, p)| p.mapv(f32::abs).sum()).sum()
    }

    fn l2_magnitude(&self) -> f32 {
        self.params.iter().map(|(_, p)| p.mapv(|v| v * v).sum()).sum()
    }

    fn score(&self) -> f32 {
        0.0
    }

    fn fit(&mut self) -> Result<()> {
        Ok(())
    }

    fn compute_gradient_and_score(&mut self) -> Result<()> {
        Ok(())
    }

    fn accumulate_score(&mut self, _accum: f32) {}

    fn validate_input(&self) -> Result<()> {
        match &self.input {
            Some(input) => Self::to_rows(input.view()).map(|_| ()),
            None => Ok(()),
        }
    }

    fn clear(&mut self) {
        self.input = None;
        self.cache = None;
    }

    fn try_clone_box(&self) -> Result<Box<dyn Layer>> {
        Ok(Box::new(self.clone()))
    }
}
