use std::fmt;
use std::str::FromStr;

use ndarray::{Array, ArrayBase, Data, Dimension};
use serde::{Serialize, Deserialize};

use crate::error::LayerError;

/// An enumeration of the activation functions a layer configuration can name.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum Activation {
    #[default]
    Relu,
    Linear,
    Sigmoid,
    Tanh,
    LeakyRelu { alpha: f32 },
    Elu { alpha: f32 },
    Gelu,
}

impl Activation {
    /// Apply the activation function to an array of any dimensionality in-place.
    pub fn apply<D: Dimension>(&self, input: &mut Array<f32, D>) {
        match self {
            Activation::Relu => {
                input.mapv_inplace(|v| v.max(0.0));
            }
            Activation::Linear => {}
            Activation::Sigmoid => {
                input.mapv_inplace(|v| 1.0 / (1.0 + (-v).exp()));
            }
            Activation::Tanh => {
                input.mapv_inplace(|v| v.tanh());
            }
            Activation::LeakyRelu { alpha } => {
                let a = *alpha;
                input.mapv_inplace(|v| if v > 0.0 { v } else { a * v });
            }
            Activation::Elu { alpha } => {
                let a = *alpha;
                input.mapv_inplace(|v| if v > 0.0 { v } else { a * (v.exp() - 1.0) });
            }
            Activation::Gelu => {
                use super::gelu::Gelu;
                Gelu::apply(input);
            }
        }
    }

    /// Compute the derivative of the activation function element-wise.
    pub fn derivative<S, D>(&self, input: &ArrayBase<S, D>) -> Array<f32, D>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        match self {
            Activation::Relu => {
                input.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 })
            }
            Activation::Linear => {
                input.mapv(|_| 1.0)
            }
            Activation::Sigmoid => {
                input.mapv(|v| {
                    let sigmoid = 1.0 / (1.0 + (-v).exp());
                    sigmoid * (1.0 - sigmoid)
                })
            }
            Activation::Tanh => {
                input.mapv(|v| {
                    let tanh_v = v.tanh();
                    1.0 - tanh_v * tanh_v
                })
            }
            Activation::LeakyRelu { alpha } => {
                let a = *alpha;
                input.mapv(|v| if v > 0.0 { 1.0 } else { a })
            }
            Activation::Elu { alpha } => {
                let a = *alpha;
                input.mapv(|v| if v > 0.0 { 1.0 } else { a * v.exp() })
            }
            Activation::Gelu => {
                use super::gelu::Gelu;
                Gelu::derivative(input)
            }
        }
    }

    /// The identifier this activation is addressed by in a configuration.
    pub fn identifier(&self) -> &'static str {
        match self {
            Activation::Relu => "relu",
            Activation::Linear => "linear",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
            Activation::LeakyRelu { .. } => "leakyrelu",
            Activation::Elu { .. } => "elu",
            Activation::Gelu => "gelu",
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for Activation {
    type Err = LayerError;

    /// Parse an activation identifier. Parameterized activations get their
    /// usual default slope.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "relu" => Ok(Activation::Relu),
            "linear" | "identity" => Ok(Activation::Linear),
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            "leakyrelu" => Ok(Activation::LeakyRelu { alpha: 0.01 }),
            "elu" => Ok(Activation::Elu { alpha: 1.0 }),
            "gelu" => Ok(Activation::Gelu),
            other => Err(LayerError::invalid_parameter(
                "activation".to_string(),
                format!("unknown activation function '{}'", other),
            )),
        }
    }
}
