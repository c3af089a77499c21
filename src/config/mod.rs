//! Configuration: command line parsing and validation
//!
//! # Usage
//!
//! ```bash
//! sam-onnx-export --checkpoint-path sam_vit_h_4b8939.pth --dataset-path ./dataset
//! sam-onnx-export --model_type vit_b --checkpoint-path sam_vit_b_01ec64.pth --quantize
//! sam-onnx-export --onnx-models-path ./out --opset-version 17
//! ```

mod args;
mod export;

pub use args::{
    parse_args, Cli, DEFAULT_CHECKPOINT, DEFAULT_DATASET_PATH, DEFAULT_MODEL_TYPE,
    DEFAULT_OUTPUT_DIR,
};
pub use export::ExportConfig;
