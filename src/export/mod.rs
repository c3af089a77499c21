//! ONNX export of the SAM prompt encoder and mask decoder
//!
//! One artifact is written per dataset image size as
//! `sam_onnx.<height>_<width>.onnx`.

pub mod adapter;
pub mod dummy;
mod exporter;
pub mod pipeline;
mod result;

pub use adapter::SamOnnxAdapter;
pub use dummy::{DummyInputs, DYNAMIC_AXES, INPUT_NAMES, OUTPUT_NAMES};
pub use exporter::{artifact_name, Exporter, DEFAULT_OPSET};
pub use pipeline::{run, run_with_progress, PipelineReport, Progress};
pub use result::ExportResult;
