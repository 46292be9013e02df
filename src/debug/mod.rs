pub mod gradient_check;
pub mod numerical_check;

pub use gradient_check::check_input_gradient;
pub use numerical_check::{check_gradient, check_params, NumericalIssue};
