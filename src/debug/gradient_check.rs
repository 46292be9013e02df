use ndarray::{ArrayD, ArrayViewD};

use crate::error::{LayerError, Result};
use crate::layers::Layer;

/// Loss used by the check: half the squared norm of the layer output, so
/// the output epsilon equals the output itself.
fn half_squared_norm(output: &ArrayD<f32>) -> f32 {
    0.5 * output.iter().map(|&x| x * x).sum::<f32>()
}

/// Compare the input epsilon from `backprop_gradient` against central finite
/// differences. Runs in inference mode so dropout does not perturb the loss.
/// Returns the largest relative error over all input entries.
pub fn check_input_gradient(layer: &mut dyn Layer, input: ArrayViewD<f32>, epsilon: f32) -> Result<f32> {
    if epsilon <= 0.0 {
        return Err(LayerError::invalid_parameter(
            "epsilon".to_string(),
            format!("finite difference step must be positive, got {}", epsilon),
        ));
    }

    let output = layer.activate(input.view(), false)?;
    let (_, analytical) = layer.backprop_gradient(output.view())?;
    if analytical.shape() != input.shape() {
        return Err(LayerError::dimension_mismatch(
            format!("{:?}", input.shape()),
            format!("{:?}", analytical.shape()),
        ));
    }

    let mut perturbed = input.to_owned();
    let mut max_relative_error = 0.0f32;

    for (idx, &analytic) in analytical.indexed_iter() {
        let original = perturbed[idx.clone()];

        perturbed[idx.clone()] = original + epsilon;
        let loss_plus = half_squared_norm(&layer.activate(perturbed.view(), false)?);

        perturbed[idx.clone()] = original - epsilon;
        let loss_minus = half_squared_norm(&layer.activate(perturbed.view(), false)?);

        perturbed[idx.clone()] = original;

        let numerical = (loss_plus - loss_minus) / (2.0 * epsilon);
        let scale = (analytic.abs() + numerical.abs()).max(1.0);
        max_relative_error = max_relative_error.max((analytic - numerical).abs() / scale);
    }

    // Leave the layer's caches describing the unperturbed input
    layer.activate(input, false)?;

    Ok(max_relative_error)
}

/// Compute the L2 norm of every present gradient, keyed by variable
pub fn gradient_norms(gradient: &crate::gradient::Gradient) -> Vec<(String, f32)> {
    gradient
        .gradient_for_variable()
        .iter()
        .filter_map(|(name, grad)| {
            grad.as_ref()
                .map(|g| (name.clone(), g.iter().map(|&x| x * x).sum::<f32>().sqrt()))
        })
        .collect()
}

/// Check for vanishing gradients
pub fn check_vanishing_gradient(gradient: &crate::gradient::Gradient, threshold: f32) -> bool {
    gradient
        .gradient_for_variable()
        .values()
        .flatten()
        .all(|g| g.iter().map(|&x| x.abs()).fold(0.0f32, f32::max) < threshold)
}

/// Check for exploding gradients
pub fn check_exploding_gradient(gradient: &crate::gradient::Gradient, threshold: f32) -> bool {
    gradient
        .gradient_for_variable()
        .values()
        .flatten()
        .any(|g| g.iter().map(|&x| x.abs()).fold(0.0f32, f32::max) > threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradient::Gradient;
    use ndarray::arr1;

    fn gradient() -> Gradient {
        let mut gradient = Gradient::new();
        gradient.set("W", None);
        gradient.set("beta", Some(arr1(&[3.0, -4.0]).into_dyn()));
        gradient.set("gamma", Some(arr1(&[1e-9, 0.0]).into_dyn()));
        gradient
    }

    #[test]
    fn test_gradient_norms_skip_absent() {
        let norms = gradient_norms(&gradient());
        assert_eq!(norms.len(), 2);
        assert_eq!(norms[0], ("beta".to_string(), 5.0));
    }

    #[test]
    fn test_vanishing_and_exploding() {
        let gradient = gradient();
        assert!(!check_vanishing_gradient(&gradient, 1e-6));
        assert!(check_vanishing_gradient(&gradient, 10.0));
        assert!(check_exploding_gradient(&gradient, 3.5));
        assert!(!check_exploding_gradient(&gradient, 4.5));
    }
}
