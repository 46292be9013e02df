//! # netlayers - Pooling and Batch-Normalization Layers on ndarray
//!
//! Building blocks for convolutional networks: a subsampling (pooling) layer
//! with average, max, sum and pass-through reductions, and the batch
//! normalization parameter initializer that creates the `gamma`/`beta`
//! arrays a normalization layer scales and shifts with.
//!
//! ## Quick Start
//!
//! ```rust
//! use netlayers::config::{NeuralNetConfiguration, PoolingType};
//! use netlayers::layers::{Layer, SubsamplingLayer};
//! use ndarray::Array4;
//!
//! let conf = NeuralNetConfiguration::builder()
//!     .kernel_size((2, 2))
//!     .pooling_type(PoolingType::Max)
//!     .build()
//!     .unwrap();
//! let mut layer = SubsamplingLayer::new(conf);
//!
//! let input = Array4::<f32>::ones((1, 3, 4, 4)).into_dyn();
//! let output = layer.activate(input.view(), false).unwrap();
//! assert_eq!(output.shape(), &[1, 3, 2, 2]);
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - Activation functions addressed by identifier
//! - [`config`] - Layer configuration and its builder
//! - [`convolution`] - `im2col` / `col2im` block extraction
//! - [`debug`] - Numerical checks and finite-difference gradient checking
//! - [`dropout`] - Inverted dropout masks
//! - [`error`] - Error types and result handling
//! - [`gradient`] - Named gradients returned by backprop
//! - [`layers`] - The `Layer` trait, subsampling and batch normalization
//! - [`params`] - Parameter tables and initializers

pub mod activations;
pub mod config;
pub mod convolution;
pub mod debug;
pub mod dropout;
pub mod error;
pub mod gradient;
pub mod layers;
pub mod params;

#[cfg(test)]
mod tests;
