use std::collections::BTreeMap;

use ndarray::{Array1, ArrayD};

/// Gradients produced by a backward pass, keyed by the parameter they belong to.
///
/// A key may be present with no value: the layer acknowledges the variable
/// but has nothing to contribute for it (pooling has no weights).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Gradient {
    variables: BTreeMap<String, Option<ArrayD<f32>>>,
}

impl Gradient {
    pub fn new() -> Self {
        Gradient::default()
    }

    pub fn set<S: Into<String>>(&mut self, variable: S, gradient: Option<ArrayD<f32>>) {
        self.variables.insert(variable.into(), gradient);
    }

    /// Gradient for `variable`, if the variable is present and has a value.
    pub fn get(&self, variable: &str) -> Option<&ArrayD<f32>> {
        self.variables.get(variable).and_then(|g| g.as_ref())
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.variables.contains_key(variable)
    }

    pub fn gradient_for_variable(&self) -> &BTreeMap<String, Option<ArrayD<f32>>> {
        &self.variables
    }

    /// All present gradients concatenated in key order.
    pub fn flattened(&self) -> Array1<f32> {
        self.variables
            .values()
            .flatten()
            .flat_map(|g| g.iter().copied())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}
