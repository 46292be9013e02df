use ndarray::{Array1, ArrayD};

use super::{ParamInitializer, ParamTable};
use crate::config::{LayerKind, NeuralNetConfiguration};
use crate::error::{LayerError, Result};

/// Creates the scale (`gamma`) and shift (`beta`) vectors of a batch
/// normalization layer: one entry per activation for dense input, one per
/// feature map for convolutional input.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchNormParamInitializer;

impl BatchNormParamInitializer {
    pub const GAMMA: &'static str = "gamma";
    pub const BETA: &'static str = "beta";

    pub fn new() -> Self {
        BatchNormParamInitializer
    }

    /// `[gamma; n_out]`
    pub fn create_gamma(&self, conf: &NeuralNetConfiguration) -> Result<ArrayD<f32>> {
        let (n_out, gamma, _) = batch_norm_settings(conf)?;
        Ok(Array1::from_elem(n_out, gamma).into_dyn())
    }

    /// `[beta; n_out]`
    pub fn create_beta(&self, conf: &NeuralNetConfiguration) -> Result<ArrayD<f32>> {
        let (n_out, _, beta) = batch_norm_settings(conf)?;
        Ok(Array1::from_elem(n_out, beta).into_dyn())
    }
}

impl ParamInitializer for BatchNormParamInitializer {
    fn init(&self, params: &mut ParamTable, conf: &mut NeuralNetConfiguration) -> Result<()> {
        let gamma = self.create_gamma(conf)?;
        let beta = self.create_beta(conf)?;

        params.insert(Self::GAMMA, gamma);
        conf.add_variable(Self::GAMMA);
        params.insert(Self::BETA, beta);
        conf.add_variable(Self::BETA);

        Ok(())
    }
}

fn batch_norm_settings(conf: &NeuralNetConfiguration) -> Result<(usize, f32, f32)> {
    match conf.layer {
        LayerKind::BatchNormalization { n_out, gamma, beta, .. } => {
            if n_out == 0 {
                return Err(LayerError::invalid_parameter(
                    "n_out".to_string(),
                    "batch normalization needs at least one feature".to_string(),
                ));
            }
            Ok((n_out, gamma, beta))
        }
        ref other => Err(LayerError::invalid_parameter(
            "layer".to_string(),
            format!("expected a batch normalization layer, got {:?}", other),
        )),
    }
}
