use ndarray::{ArrayBase, ArrayD, Data, Dimension};

use crate::gradient::Gradient;
use crate::params::ParamTable;

/// Types of numerical issues
#[derive(Debug, Clone, PartialEq)]
pub enum NumericalIssue {
    NaN { count: usize },
    Infinity { count: usize },
    Underflow { count: usize },
    Overflow { count: usize },
}

/// Magnitude limits below/above which a finite value is reported
#[derive(Debug, Clone, Copy)]
struct Thresholds {
    underflow: f32,
    overflow: f32,
}

const PARAM_THRESHOLDS: Thresholds = Thresholds { underflow: 1e-38, overflow: 1e38 };
const GRADIENT_THRESHOLDS: Thresholds = Thresholds { underflow: 1e-7, overflow: 1e3 };

fn scan<S, D>(name: &str, kind: &str, values: &ArrayBase<S, D>, limits: Thresholds) -> Vec<NumericalIssue>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    let mut nan_count = 0;
    let mut inf_count = 0;
    let mut underflow_count = 0;
    let mut overflow_count = 0;

    for &value in values.iter() {
        if value.is_nan() {
            nan_count += 1;
        } else if value.is_infinite() {
            inf_count += 1;
        } else if value != 0.0 && value.abs() < limits.underflow {
            underflow_count += 1;
        } else if value.abs() > limits.overflow {
            overflow_count += 1;
        }
    }

    let mut issues = Vec::new();
    if nan_count > 0 {
        issues.push(NumericalIssue::NaN { count: nan_count });
        eprintln!("{} '{}': Found {} NaN values", kind, name, nan_count);
    }
    if inf_count > 0 {
        issues.push(NumericalIssue::Infinity { count: inf_count });
        eprintln!("{} '{}': Found {} infinite values", kind, name, inf_count);
    }
    if underflow_count > 0 {
        issues.push(NumericalIssue::Underflow { count: underflow_count });
        eprintln!("{} '{}': Found {} underflow values", kind, name, underflow_count);
    }
    if overflow_count > 0 {
        issues.push(NumericalIssue::Overflow { count: overflow_count });
        eprintln!("{} '{}': Found {} overflow risk values", kind, name, overflow_count);
    }

    issues
}

/// Check every array of a parameter table for numerical issues
pub fn check_params(params: &ParamTable) -> Vec<NumericalIssue> {
    params
        .iter()
        .flat_map(|(name, values)| scan(name, "Parameter", values, PARAM_THRESHOLDS))
        .collect()
}

/// Check the present gradients for numerical issues
pub fn check_gradient(gradient: &Gradient) -> Vec<NumericalIssue> {
    gradient
        .gradient_for_variable()
        .iter()
        .filter_map(|(name, values)| values.as_ref().map(|v| (name, v)))
        .flat_map(|(name, values)| scan(name, "Gradient", values, GRADIENT_THRESHOLDS))
        .collect()
}

/// Check an activation or epsilon array for numerical issues
pub fn check_activations<S, D>(label: &str, values: &ArrayBase<S, D>) -> Vec<NumericalIssue>
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    scan(label, "Activation", values, PARAM_THRESHOLDS)
}

/// Sanitize an array by replacing NaN and Inf values
pub fn sanitize_array(array: &mut ArrayD<f32>, nan_replacement: f32, inf_replacement: f32) {
    array.mapv_inplace(|x| {
        if x.is_nan() {
            nan_replacement
        } else if x.is_infinite() {
            if x.is_sign_positive() {
                inf_replacement
            } else {
                -inf_replacement
            }
        } else {
            x
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr1, IxDyn};

    #[test]
    fn test_detects_nan_and_infinity_in_params() {
        let mut params = ParamTable::new();
        params.insert("gamma", arr1(&[1.0, f32::NAN, f32::INFINITY]).into_dyn());

        let issues = check_params(&params);
        assert!(issues.contains(&NumericalIssue::NaN { count: 1 }));
        assert!(issues.contains(&NumericalIssue::Infinity { count: 1 }));
    }

    #[test]
    fn test_exploding_gradient_reported() {
        let mut gradient = Gradient::new();
        gradient.set("W", None);
        gradient.set("beta", Some(arr1(&[5000.0, 0.5]).into_dyn()));

        assert_eq!(check_gradient(&gradient), vec![NumericalIssue::Overflow { count: 1 }]);
    }

    #[test]
    fn test_activation_underflow_reported() {
        let activations = arr1(&[1e-40f32, 0.0, 1.0]);
        assert_eq!(check_activations("pooled", &activations), vec![NumericalIssue::Underflow { count: 1 }]);
    }

    #[test]
    fn test_sanitize_array() {
        let mut array = ArrayD::from_shape_vec(IxDyn(&[3]), vec![f32::NAN, f32::NEG_INFINITY, 2.0]).unwrap();
        sanitize_array(&mut array, 0.0, 10.0);
        assert_eq!(array.as_slice().unwrap(), &[0.0, -10.0, 2.0]);
    }
}
