//! Factor-graph layer: keys, noise models, factors, stores, optimizers.

mod factor;
mod incremental;
mod key;
pub mod linear;
mod noise;
mod optimizer;
mod store;
mod values;

pub use factor::{Factor, LinearBlock, LinearizedFactor};
pub use incremental::{IncrementalOptimizer, IncrementalParams};
pub use key::Key;
pub use noise::{DiagonalNoise, NoiseModels};
pub use optimizer::{LmConfig, LmOptimizer, OptimizationReport, StopReason};
pub use store::{FactorId, FactorStore};
pub use values::{Value, Values};
