//! Post-training dynamic quantization
//!
//! Rewrites exported models so that weights of linear and convolution layers
//! are stored as 8-bit integers:
//! - Min-max per-tensor parameters (`params`)
//! - Graph rewriting to integer ops (`dynamic`)
//! - In-place file quantization through a scratch copy (`file`)

mod dynamic;
mod file;
mod params;

pub use dynamic::{DynamicQuantConfig, DynamicQuantizer, QuantReport};
pub use file::{quantize_file, TEMP_MODEL_NAME};
pub use params::{compute_params, quantize_weights, QuantParams, QuantizedData, WeightType};
