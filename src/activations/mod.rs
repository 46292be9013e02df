//! # Activation Functions Module
//!
//! Activation functions addressed by the identifier stored in a layer
//! configuration. Every function works on arrays of any dimensionality, so
//! the same value serves 2-D dense activations and 4-D NCHW feature maps.
//!
//! ## Available Activations
//!
//! - **ReLU** (`"relu"`): `max(0, x)`
//! - **Sigmoid** (`"sigmoid"`): `1 / (1 + e^(-x))`
//! - **Tanh** (`"tanh"`): hyperbolic tangent
//! - **Linear** (`"linear"` / `"identity"`): no transformation
//! - **LeakyReLU** (`"leakyrelu"`): ReLU with small negative slope
//! - **ELU** (`"elu"`): exponential linear unit
//! - **GELU** (`"gelu"`): Gaussian error linear unit
//!
//! ## Usage Example
//!
//! ```rust
//! use netlayers::activations::Activation;
//! use ndarray::array;
//!
//! let relu: Activation = "relu".parse().unwrap();
//! let mut data = array![[1.0, -0.5], [0.0, 2.0]];
//! relu.apply(&mut data);
//! assert_eq!(data, array![[1.0, 0.0], [0.0, 2.0]]);
//! ```

pub mod functions;
pub mod gelu;

pub use functions::Activation;
