//! Parameter tables and the initializers that fill them
//!
//! A layer owns a [`ParamTable`]. Before first use the owning model hands
//! the table and the layer's configuration to a [`ParamInitializer`], which
//! creates the named arrays and records their names in the configuration's
//! variable registry.

use std::collections::BTreeMap;

use crate::config::NeuralNetConfiguration;
use crate::error::Result;

pub mod batch_norm;
pub mod convolution;
pub mod initialization;
pub mod table;

pub use batch_norm::BatchNormParamInitializer;
pub use convolution::ConvolutionParamInitializer;
pub use initialization::WeightInit;
pub use table::ParamTable;

/// Free-form settings some initializers accept on top of the layer configuration.
pub type ExtraConfig = BTreeMap<String, String>;

/// Populates a parameter table from a layer configuration.
pub trait ParamInitializer: Send + Sync {
    /// Create this initializer's parameters in `params` and register their
    /// names with `conf`.
    fn init(&self, params: &mut ParamTable, conf: &mut NeuralNetConfiguration) -> Result<()>;

    /// Variant taking extra settings. Initializers that have none to read
    /// behave exactly like [`init`](Self::init).
    fn init_with_extra(
        &self,
        params: &mut ParamTable,
        conf: &mut NeuralNetConfiguration,
        _extra: &ExtraConfig,
    ) -> Result<()> {
        self.init(params, conf)
    }
}
