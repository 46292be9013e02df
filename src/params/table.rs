use std::collections::BTreeMap;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use bincode::{deserialize, serialize};
use ndarray::{s, Array1, ArrayD};
use serde::{Serialize, Deserialize};

use crate::error::{LayerError, Result};

/// Named parameter arrays owned by a layer.
///
/// Iteration, flattening and unflattening all follow key order, so
/// `set_flattened(&table.flattened())` leaves the table unchanged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamTable {
    params: BTreeMap<String, ArrayD<f32>>,
}

impl ParamTable {
    pub fn new() -> Self {
        ParamTable::default()
    }

    /// Insert or replace a parameter, returning the previous array.
    pub fn insert<S: Into<String>>(&mut self, name: S, value: ArrayD<f32>) -> Option<ArrayD<f32>> {
        self.params.insert(name.into(), value)
    }

    pub fn get(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.params.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ArrayD<f32>> {
        self.params.get_mut(name)
    }

    /// Like [`get`](Self::get), but a missing name is an error.
    pub fn require(&self, name: &str) -> Result<&ArrayD<f32>> {
        self.params
            .get(name)
            .ok_or_else(|| LayerError::MissingParameter(name.to_string()))
    }

    pub fn remove(&mut self, name: &str) -> Option<ArrayD<f32>> {
        self.params.remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.params.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayD<f32>)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    /// Total number of scalar parameters across all arrays.
    pub fn num_params(&self) -> usize {
        self.params.values().map(|p| p.len()).sum()
    }

    /// Every array concatenated into one vector, in key order.
    pub fn flattened(&self) -> Array1<f32> {
        self.params
            .values()
            .flat_map(|p| p.iter().copied())
            .collect()
    }

    /// Overwrite every array from a flat vector laid out as [`flattened`](Self::flattened).
    pub fn set_flattened(&mut self, flat: &Array1<f32>) -> Result<()> {
        let expected = self.num_params();
        if flat.len() != expected {
            return Err(LayerError::dimension_mismatch(
                format!("{} parameters", expected),
                format!("{} parameters", flat.len()),
            ));
        }

        let mut offset = 0;
        for param in self.params.values_mut() {
            let len = param.len();
            let values = flat.slice(s![offset..offset + len]).to_vec();
            *param = ArrayD::from_shape_vec(param.raw_dim(), values)?;
            offset += len;
        }

        Ok(())
    }

    pub fn clear(&mut self) {
        self.params.clear();
    }

    /// Write the table to `path` in bincode format.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let serialized = serialize(self)?;
        let mut file = fs::File::create(path)?;
        file.write_all(&serialized)?;
        Ok(())
    }

    /// Read a table written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = fs::File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(deserialize(&buffer)?)
    }
}

impl FromIterator<(String, ArrayD<f32>)> for ParamTable {
    fn from_iter<I: IntoIterator<Item = (String, ArrayD<f32>)>>(iter: I) -> Self {
        ParamTable {
            params: iter.into_iter().collect(),
        }
    }
}
