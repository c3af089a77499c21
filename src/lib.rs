//! sam-onnx-export: Segment Anything checkpoint to ONNX exporter
//!
//! Builds the prompt encoder and mask decoder of a SAM checkpoint as an ONNX
//! graph, once per distinct image size found in a dataset, and optionally
//! rewrites the weights with 8-bit dynamic quantization.
//!
//! # Modules
//!
//! - [`config`]: command line arguments and validated settings
//! - [`dataset`]: image size discovery
//! - [`checkpoint`]: PyTorch and SafeTensors weight loading
//! - [`model`]: variant registry and model parts
//! - [`onnx`]: protobuf types, graph building and clean-up passes
//! - [`export`]: graph adapter, exporter and pipeline
//! - [`quant`]: dynamic weight quantization
//! - [`cli`]: command handler and console output

pub mod checkpoint;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod export;
pub mod model;
pub mod onnx;
pub mod quant;

pub use error::{ExportError, Result};
