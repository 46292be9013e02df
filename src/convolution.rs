//! Block extraction over NCHW arrays
//!
//! `im2col` unfolds every kernel-sized spatial block of a `[batch, channels,
//! height, width]` array into a `[batch, channels, kh, kw, out_h, out_w]`
//! array, so pooling reductions become reductions over axes 2 and 3.
//! `col2im` folds such an array back, summing where blocks overlap.

use ndarray::{s, Array4, Array6, ArrayView4, ArrayView6, Zip};

use crate::error::{LayerError, Result};

/// Number of windows along one spatial axis.
pub fn output_size(input: usize, kernel: usize, stride: usize, padding: usize) -> Result<usize> {
    if stride == 0 {
        return Err(LayerError::invalid_parameter(
            "stride".to_string(),
            "stride must be positive".to_string(),
        ));
    }
    if kernel == 0 {
        return Err(LayerError::invalid_parameter(
            "kernel_size".to_string(),
            "kernel dimensions must be positive".to_string(),
        ));
    }
    let padded = input + 2 * padding;
    if kernel > padded {
        return Err(LayerError::dimension_mismatch(
            format!("padded input extent >= kernel extent {}", kernel),
            format!("padded input extent {}", padded),
        ));
    }
    Ok((padded - kernel) / stride + 1)
}

/// Pad input with a constant value
fn pad_input(input: ArrayView4<f32>, padding: (usize, usize), pad_value: f32) -> Array4<f32> {
    let (batch_size, channels, height, width) = input.dim();
    if padding == (0, 0) {
        return input.to_owned();
    }

    let mut padded = Array4::from_elem(
        (batch_size, channels, height + 2 * padding.0, width + 2 * padding.1),
        pad_value,
    );
    padded
        .slice_mut(s![.., .., padding.0..padding.0 + height, padding.1..padding.1 + width])
        .assign(&input);
    padded
}

/// Unfold spatial blocks, zero padded.
pub fn im2col(
    input: ArrayView4<f32>,
    kernel: (usize, usize),
    stride: (usize, usize),
    padding: (usize, usize),
) -> Result<Array6<f32>> {
    im2col_with_pad_value(input, kernel, stride, padding, 0.0)
}

/// Unfold spatial blocks, filling padded cells with `pad_value`.
pub fn im2col_with_pad_value(
    input: ArrayView4<f32>,
    kernel: (usize, usize),
    stride: (usize, usize),
    padding: (usize, usize),
    pad_value: f32,
) -> Result<Array6<f32>> {
    let (batch_size, channels, height, width) = input.dim();
    let out_height = output_size(height, kernel.0, stride.0, padding.0)?;
    let out_width = output_size(width, kernel.1, stride.1, padding.1)?;

    let padded = pad_input(input, padding, pad_value);
    let mut col = Array6::zeros((batch_size, channels, kernel.0, kernel.1, out_height, out_width));

    Zip::indexed(&mut col).par_for_each(|(b, c, kh, kw, oh, ow), value| {
        *value = padded[[b, c, oh * stride.0 + kh, ow * stride.1 + kw]];
    });

    Ok(col)
}

/// Fold `[batch, channels, kh, kw, out_h, out_w]` columns back into a
/// `[batch, channels, height, width]` array. Overlapping contributions are
/// summed; contributions landing in the padding are dropped.
pub fn col2im(
    col: ArrayView6<f32>,
    stride: (usize, usize),
    padding: (usize, usize),
    height: usize,
    width: usize,
) -> Result<Array4<f32>> {
    let (batch_size, channels, kernel_h, kernel_w, out_height, out_width) = col.dim();

    let expected_h = output_size(height, kernel_h, stride.0, padding.0)?;
    let expected_w = output_size(width, kernel_w, stride.1, padding.1)?;
    if (expected_h, expected_w) != (out_height, out_width) {
        return Err(LayerError::dimension_mismatch(
            format!("{}x{} output windows", expected_h, expected_w),
            format!("{}x{} output windows", out_height, out_width),
        ));
    }

    let mut padded = Array4::zeros((
        batch_size,
        channels,
        height + 2 * padding.0,
        width + 2 * padding.1,
    ));

    for ((b, c, kh, kw, oh, ow), &value) in col.indexed_iter() {
        padded[[b, c, oh * stride.0 + kh, ow * stride.1 + kw]] += value;
    }

    Ok(padded
        .slice(s![.., .., padding.0..padding.0 + height, padding.1..padding.1 + width])
        .to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(shape: (usize, usize, usize, usize)) -> Array4<f32> {
        let len = shape.0 * shape.1 * shape.2 * shape.3;
        Array4::from_shape_vec(shape, (1..=len).map(|v| v as f32).collect()).unwrap()
    }

    #[test]
    fn test_output_size() {
        assert_eq!(output_size(4, 2, 2, 0).unwrap(), 2);
        assert_eq!(output_size(5, 3, 1, 1).unwrap(), 5);
        assert_eq!(output_size(7, 3, 2, 0).unwrap(), 3);
        assert!(output_size(2, 3, 1, 0).is_err());
        assert!(output_size(4, 2, 0, 0).is_err());
    }

    #[test]
    fn test_im2col_shape_and_values() {
        let input = ramp((1, 1, 4, 4));
        let col = im2col(input.view(), (2, 2), (2, 2), (0, 0)).unwrap();

        assert_eq!(col.dim(), (1, 1, 2, 2, 2, 2));
        // Top-left block is [1, 2; 5, 6]
        assert_eq!(col[[0, 0, 0, 0, 0, 0]], 1.0);
        assert_eq!(col[[0, 0, 0, 1, 0, 0]], 2.0);
        assert_eq!(col[[0, 0, 1, 0, 0, 0]], 5.0);
        assert_eq!(col[[0, 0, 1, 1, 0, 0]], 6.0);
        // Bottom-right block is [11, 12; 15, 16]
        assert_eq!(col[[0, 0, 1, 1, 1, 1]], 16.0);
    }

    #[test]
    fn test_im2col_padding_value() {
        let input = ramp((1, 1, 2, 2));
        let col = im2col_with_pad_value(input.view(), (2, 2), (1, 1), (1, 1), -1.0).unwrap();

        assert_eq!(col.dim(), (1, 1, 2, 2, 3, 3));
        assert_eq!(col[[0, 0, 0, 0, 0, 0]], -1.0);
        assert_eq!(col[[0, 0, 1, 1, 0, 0]], 1.0);
    }

    #[test]
    fn test_col2im_inverts_non_overlapping_blocks() {
        let input = ramp((2, 3, 4, 6));
        let col = im2col(input.view(), (2, 3), (2, 3), (0, 0)).unwrap();
        let restored = col2im(col.view(), (2, 3), (0, 0), 4, 6).unwrap();
        assert_eq!(restored, input);
    }

    #[test]
    fn test_col2im_sums_overlaps() {
        let input = Array4::ones((1, 1, 3, 3));
        let col = im2col(input.view(), (2, 2), (1, 1), (0, 0)).unwrap();
        let folded = col2im(col.view(), (1, 1), (0, 0), 3, 3).unwrap();

        // Corners are covered once, edges twice, the centre four times
        assert_eq!(folded[[0, 0, 0, 0]], 1.0);
        assert_eq!(folded[[0, 0, 0, 1]], 2.0);
        assert_eq!(folded[[0, 0, 1, 1]], 4.0);
    }

    #[test]
    fn test_col2im_rejects_mismatched_windows() {
        let col = Array6::<f32>::zeros((1, 1, 2, 2, 3, 3));
        assert!(col2im(col.view(), (2, 2), (0, 0), 4, 4).is_err());
    }
}
