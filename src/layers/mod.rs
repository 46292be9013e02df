pub mod batch_norm;
pub mod subsampling;
pub mod traits;

pub use batch_norm::BatchNormalizationLayer;
pub use subsampling::SubsamplingLayer;
pub use traits::{Layer, LayerType};
