//! Layer configuration
//!
//! A [`NeuralNetConfiguration`] carries everything a layer or parameter
//! initializer needs to know about its shape and behaviour: kernel geometry,
//! pooling type, dropout rate, activation, and the registry of variable
//! names the parameter initializers have created.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{LayerError, Result};

/// Reduction applied by a subsampling layer over each spatial block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PoolingType {
    Avg,
    Max,
    Sum,
    None,
}

impl fmt::Display for PoolingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PoolingType::Avg => "avg",
            PoolingType::Max => "max",
            PoolingType::Sum => "sum",
            PoolingType::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for PoolingType {
    type Err = LayerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "avg" | "average" => Ok(PoolingType::Avg),
            "max" => Ok(PoolingType::Max),
            "sum" => Ok(PoolingType::Sum),
            "none" => Ok(PoolingType::None),
            other => Err(LayerError::invalid_parameter(
                "pooling_type".to_string(),
                format!("unknown pooling type '{}'", other),
            )),
        }
    }
}

/// Kind-specific settings of the layer a configuration describes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LayerKind {
    Subsampling,
    Convolution {
        n_in: usize,
        n_out: usize,
    },
    BatchNormalization {
        /// Number of features (activations or feature maps) normalized
        n_out: usize,
        /// Initial value of every scale entry
        gamma: f32,
        /// Initial value of every shift entry
        beta: f32,
        /// Small constant for numerical stability
        eps: f32,
        /// Momentum of the running statistics
        decay: f32,
    },
}

impl LayerKind {
    /// Batch normalization over `n_out` features with gamma = 1 and beta = 0.
    pub fn batch_normalization(n_out: usize) -> Self {
        LayerKind::BatchNormalization {
            n_out,
            gamma: 1.0,
            beta: 0.0,
            eps: 1e-5,
            decay: 0.9,
        }
    }
}

/// Configuration shared by a layer and its parameter initializer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NeuralNetConfiguration {
    pub layer: LayerKind,

    /// Pooling window / convolution kernel (height, width)
    pub kernel_size: (usize, usize),

    /// Step between windows (height, width)
    pub stride: (usize, usize),

    /// Zero padding added on each side (height, width)
    pub padding: (usize, usize),

    /// `None` means the selector was never set; pooling refuses to run.
    pub pooling_type: Option<PoolingType>,

    /// Probability of dropping an input unit during training
    pub dropout: f32,

    pub activation: Activation,

    pub learning_rate: f32,

    /// Seed for dropout masks and weight initialization
    pub seed: Option<u64>,

    variables: Vec<String>,
}

impl NeuralNetConfiguration {
    pub fn builder() -> NeuralNetConfigurationBuilder {
        NeuralNetConfigurationBuilder::new()
    }

    /// Register a variable name. Registering the same name twice keeps the
    /// first registration.
    pub fn add_variable<S: Into<String>>(&mut self, name: S) {
        let name = name.into();
        if !self.variables.iter().any(|v| *v == name) {
            self.variables.push(name);
        }
    }

    /// Registered variable names, in registration order.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn clear_variables(&mut self) {
        self.variables.clear();
    }

    /// Check the invariants the builder enforces.
    pub fn validate(&self) -> Result<()> {
        if self.kernel_size.0 == 0 || self.kernel_size.1 == 0 {
            return Err(LayerError::invalid_parameter(
                "kernel_size".to_string(),
                format!("kernel dimensions must be positive, got {:?}", self.kernel_size),
            ));
        }
        if self.stride.0 == 0 || self.stride.1 == 0 {
            return Err(LayerError::invalid_parameter(
                "stride".to_string(),
                format!("stride must be positive, got {:?}", self.stride),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(LayerError::invalid_parameter(
                "dropout".to_string(),
                format!("dropout rate must be in [0, 1), got {}", self.dropout),
            ));
        }
        if !self.learning_rate.is_finite() || self.learning_rate < 0.0 {
            return Err(LayerError::invalid_parameter(
                "learning_rate".to_string(),
                format!("learning rate must be finite and non-negative, got {}", self.learning_rate),
            ));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let conf: NeuralNetConfiguration = serde_json::from_str(json)?;
        conf.validate()?;
        Ok(conf)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Builder for [`NeuralNetConfiguration`]
pub struct NeuralNetConfigurationBuilder {
    layer: LayerKind,
    kernel_size: (usize, usize),
    stride: Option<(usize, usize)>,
    padding: (usize, usize),
    pooling_type: Option<PoolingType>,
    dropout: f32,
    activation: Activation,
    learning_rate: f32,
    seed: Option<u64>,
}

impl NeuralNetConfigurationBuilder {
    pub fn new() -> Self {
        NeuralNetConfigurationBuilder {
            layer: LayerKind::Subsampling,
            kernel_size: (2, 2),
            stride: None,
            padding: (0, 0),
            pooling_type: Some(PoolingType::Max),
            dropout: 0.0,
            activation: Activation::Linear,
            learning_rate: 0.1,
            seed: None,
        }
    }

    pub fn layer(mut self, layer: LayerKind) -> Self {
        self.layer = layer;
        self
    }

    pub fn kernel_size(mut self, size: (usize, usize)) -> Self {
        self.kernel_size = size;
        self
    }

    /// Defaults to the kernel size when never set.
    pub fn stride(mut self, stride: (usize, usize)) -> Self {
        self.stride = Some(stride);
        self
    }

    pub fn padding(mut self, padding: (usize, usize)) -> Self {
        self.padding = padding;
        self
    }

    pub fn pooling_type(mut self, pooling_type: PoolingType) -> Self {
        self.pooling_type = Some(pooling_type);
        self
    }

    /// Leave the pooling selector unset.
    pub fn no_pooling_type(mut self) -> Self {
        self.pooling_type = None;
        self
    }

    pub fn dropout(mut self, dropout: f32) -> Self {
        self.dropout = dropout;
        self
    }

    pub fn activation(mut self, activation: Activation) -> Self {
        self.activation = activation;
        self
    }

    pub fn learning_rate(mut self, learning_rate: f32) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<NeuralNetConfiguration> {
        let conf = NeuralNetConfiguration {
            layer: self.layer,
            kernel_size: self.kernel_size,
            stride: self.stride.unwrap_or(self.kernel_size),
            padding: self.padding,
            pooling_type: self.pooling_type,
            dropout: self.dropout,
            activation: self.activation,
            learning_rate: self.learning_rate,
            seed: self.seed,
            variables: Vec::new(),
        };
        conf.validate()?;
        Ok(conf)
    }
}

impl Default for NeuralNetConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_defaults_to_kernel() {
        let conf = NeuralNetConfiguration::builder()
            .kernel_size((3, 2))
            .build()
            .unwrap();
        assert_eq!(conf.stride, (3, 2));
    }

    #[test]
    fn test_pooling_type_parse() {
        assert_eq!("AVG".parse::<PoolingType>().unwrap(), PoolingType::Avg);
        assert_eq!(" max ".parse::<PoolingType>().unwrap(), PoolingType::Max);
        assert!("median".parse::<PoolingType>().is_err());
    }

    #[test]
    fn test_add_variable_is_idempotent() {
        let mut conf = NeuralNetConfiguration::builder().build().unwrap();
        conf.add_variable("gamma");
        conf.add_variable("beta");
        conf.add_variable("gamma");
        assert_eq!(conf.variables(), &["gamma".to_string(), "beta".to_string()]);
    }
}
