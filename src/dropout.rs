//! Inverted dropout
//!
//! Units are zeroed with probability `rate` and survivors are scaled by
//! `1 / (1 - rate)`, so no rescaling is needed at inference time. The mask
//! holds the per-unit factor (`0` or the scale) and is reused to gate the
//! backward pass.

use ndarray::{ArrayD, IxDyn};
use rand::Rng;

use crate::error::{LayerError, Result};

/// Draw a dropout mask for an array of `shape`.
pub fn dropout_mask<R: Rng + ?Sized>(shape: &[usize], rate: f32, rng: &mut R) -> Result<ArrayD<f32>> {
    if !(0.0..1.0).contains(&rate) {
        return Err(LayerError::invalid_parameter(
            "dropout".to_string(),
            format!("dropout rate must be in [0, 1), got {}", rate),
        ));
    }

    let scale = 1.0 / (1.0 - rate);
    let mut mask = ArrayD::zeros(IxDyn(shape));
    for m in mask.iter_mut() {
        if rng.gen::<f32>() >= rate {
            *m = scale;
        }
    }

    Ok(mask)
}

/// Apply dropout to `input` in place and return the mask that was used.
pub fn apply_dropout<R: Rng + ?Sized>(input: &mut ArrayD<f32>, rate: f32, rng: &mut R) -> Result<ArrayD<f32>> {
    let mask = dropout_mask(input.shape(), rate, rng)?;
    *input *= &mask;
    Ok(mask)
}

/// Gate a gradient with a mask produced by [`apply_dropout`].
pub fn apply_mask(gradient: &mut ArrayD<f32>, mask: &ArrayD<f32>) -> Result<()> {
    if gradient.shape() != mask.shape() {
        return Err(LayerError::dimension_mismatch(
            format!("{:?}", mask.shape()),
            format!("{:?}", gradient.shape()),
        ));
    }
    *gradient *= mask;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_mask_values_are_zero_or_scale() {
        let mut rng = StdRng::seed_from_u64(42);
        let mask = dropout_mask(&[1000], 0.5, &mut rng).unwrap();

        let zero_count = mask.iter().filter(|&&x| x == 0.0).count();
        assert!(zero_count > 400 && zero_count < 600);
        for &val in mask.iter() {
            assert!(val == 0.0 || (val - 2.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_zero_rate_keeps_everything() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut input = ArrayD::ones(IxDyn(&[4, 4]));
        let mask = apply_dropout(&mut input, 0.0, &mut rng).unwrap();
        assert!(mask.iter().all(|&m| m == 1.0));
        assert!(input.iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_rejects_rate_of_one() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(dropout_mask(&[2], 1.0, &mut rng).is_err());
    }

    #[test]
    fn test_apply_mask_shape_check() {
        let mut gradient = ArrayD::ones(IxDyn(&[2, 2]));
        let mask = ArrayD::ones(IxDyn(&[4]));
        assert!(apply_mask(&mut gradient, &mask).is_err());
    }
}
