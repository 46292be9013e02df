use ndarray::{ArrayD, IxDyn};
use ndarray_rand::RandomExt;
use rand::Rng;
use rand_distr::{Normal, Uniform};

use crate::activations::Activation;
use crate::error::{LayerError, Result};

/// Weight initialization strategies
#[derive(Debug, Clone, PartialEq)]
pub enum WeightInit {
    /// Xavier/Glorot uniform initialization
    XavierUniform,

    /// Xavier/Glorot normal initialization
    XavierNormal,

    /// He/Kaiming uniform initialization (for ReLU)
    HeUniform,

    /// He/Kaiming normal initialization (for ReLU)
    HeNormal,

    /// Uniform distribution with custom range
    Uniform { min: f32, max: f32 },

    /// Normal distribution with custom mean and std
    Normal { mean: f32, std: f32 },

    /// All zeros
    Zeros,

    /// All ones
    Ones,
}

impl WeightInit {
    /// Draw an array of `shape` for a parameter with the given fan-in and fan-out.
    pub fn initialize<R: Rng + ?Sized>(
        &self,
        shape: &[usize],
        fan_in: usize,
        fan_out: usize,
        rng: &mut R,
    ) -> Result<ArrayD<f32>> {
        let shape = IxDyn(shape);

        let array = match self {
            WeightInit::XavierUniform => {
                let limit = (6.0 / (fan_in + fan_out).max(1) as f32).sqrt();
                ArrayD::random_using(shape, Uniform::new(-limit, limit), rng)
            }

            WeightInit::XavierNormal => {
                let std = (2.0 / (fan_in + fan_out).max(1) as f32).sqrt();
                ArrayD::random_using(shape, normal(0.0, std)?, rng)
            }

            WeightInit::HeUniform => {
                let limit = (6.0 / fan_in.max(1) as f32).sqrt();
                ArrayD::random_using(shape, Uniform::new(-limit, limit), rng)
            }

            WeightInit::HeNormal => {
                let std = (2.0 / fan_in.max(1) as f32).sqrt();
                ArrayD::random_using(shape, normal(0.0, std)?, rng)
            }

            WeightInit::Uniform { min, max } => {
                if min >= max {
                    return Err(LayerError::invalid_parameter(
                        "weight_init".to_string(),
                        format!("uniform range [{}, {}) is empty", min, max),
                    ));
                }
                ArrayD::random_using(shape, Uniform::new(*min, *max), rng)
            }

            WeightInit::Normal { mean, std } => {
                ArrayD::random_using(shape, normal(*mean, *std)?, rng)
            }

            WeightInit::Zeros => ArrayD::zeros(shape),

            WeightInit::Ones => ArrayD::ones(shape),
        };

        Ok(array)
    }

    /// Get the recommended initialization for an activation function
    pub fn for_activation(activation: &Activation) -> Self {
        match activation {
            Activation::Relu | Activation::LeakyRelu { .. } | Activation::Elu { .. } => {
                WeightInit::HeNormal
            }
            Activation::Sigmoid | Activation::Tanh => {
                WeightInit::XavierNormal
            }
            Activation::Linear | Activation::Gelu => {
                WeightInit::XavierNormal
            }
        }
    }
}

fn normal(mean: f32, std: f32) -> Result<Normal<f32>> {
    Normal::new(mean, std).map_err(|e| {
        LayerError::invalid_parameter("weight_init".to_string(), e.to_string())
    })
}
