use ndarray::{Array, ArrayBase, Data, Dimension};

/// GELU (Gaussian Error Linear Unit) activation function
pub struct Gelu;

impl Gelu {
    /// Approximation of GELU using tanh
    /// GELU(x) ≈ 0.5 * x * (1 + tanh(sqrt(2/π) * (x + 0.044715 * x^3)))
    pub fn apply<D: Dimension>(input: &mut Array<f32, D>) {
        let sqrt_2_over_pi = (2.0_f32 / std::f32::consts::PI).sqrt();
        input.mapv_inplace(|x| {
            let inner = sqrt_2_over_pi * (x + 0.044715 * x.powi(3));
            0.5 * x * (1.0 + inner.tanh())
        });
    }

    pub fn derivative<S, D>(input: &ArrayBase<S, D>) -> Array<f32, D>
    where
        S: Data<Elem = f32>,
        D: Dimension,
    {
        let sqrt_2_over_pi = (2.0_f32 / std::f32::consts::PI).sqrt();
        input.mapv(|x| {
            let inner = sqrt_2_over_pi * (x + 0.044715 * x.powi(3));
            let tanh_inner = inner.tanh();
            let sech2_inner = 1.0 - tanh_inner.powi(2);
            0.5 * (1.0 + tanh_inner) + 0.5 * x * sech2_inner * sqrt_2_over_pi * (1.0 + 0.134145 * x.powi(2))
        })
    }
}
