use ndarray::ArrayD;
use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{ParamInitializer, ParamTable, WeightInit};
use crate::config::{LayerKind, NeuralNetConfiguration};
use crate::error::{LayerError, Result};

/// Creates convolution kernels `W` of shape `[n_out, n_in, kh, kw]` and
/// biases `b` of shape `[n_out]`.
#[derive(Debug, Clone, Default)]
pub struct ConvolutionParamInitializer {
    /// Overrides the activation-based default when set
    pub weight_init: Option<WeightInit>,
}

impl ConvolutionParamInitializer {
    pub const WEIGHTS: &'static str = "W";
    pub const BIAS: &'static str = "b";

    pub fn new() -> Self {
        ConvolutionParamInitializer { weight_init: None }
    }

    pub fn with_weight_init(weight_init: WeightInit) -> Self {
        ConvolutionParamInitializer { weight_init: Some(weight_init) }
    }

    pub fn create_weights(&self, conf: &NeuralNetConfiguration) -> Result<ArrayD<f32>> {
        let (n_in, n_out) = channels(conf)?;
        let (kh, kw) = conf.kernel_size;
        let weight_init = self
            .weight_init
            .clone()
            .unwrap_or_else(|| WeightInit::for_activation(&conf.activation));

        let mut rng = match conf.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        weight_init.initialize(&[n_out, n_in, kh, kw], n_in * kh * kw, n_out * kh * kw, &mut rng)
    }

    pub fn create_bias(&self, conf: &NeuralNetConfiguration) -> Result<ArrayD<f32>> {
        let (_, n_out) = channels(conf)?;
        Ok(ArrayD::zeros(vec![n_out]))
    }
}

impl ParamInitializer for ConvolutionParamInitializer {
    fn init(&self, params: &mut ParamTable, conf: &mut NeuralNetConfiguration) -> Result<()> {
        let weights = self.create_weights(conf)?;
        let bias = self.create_bias(conf)?;

        params.insert(Self::WEIGHTS, weights);
        conf.add_variable(Self::WEIGHTS);
        params.insert(Self::BIAS, bias);
        conf.add_variable(Self::BIAS);

        Ok(())
    }
}

fn channels(conf: &NeuralNetConfiguration) -> Result<(usize, usize)> {
    match conf.layer {
        LayerKind::Convolution { n_in, n_out } if n_in > 0 && n_out > 0 => Ok((n_in, n_out)),
        LayerKind::Convolution { n_in, n_out } => Err(LayerError::invalid_parameter(
            "channels".to_string(),
            format!("convolution needs positive channel counts, got {} -> {}", n_in, n_out),
        )),
        ref other => Err(LayerError::invalid_parameter(
            "layer".to_string(),
            format!("expected a convolution layer, got {:?}", other),
        )),
    }
}
