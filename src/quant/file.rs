//! In-place quantization of a model file.

use std::path::Path;

use super::dynamic::{DynamicQuantConfig, DynamicQuantizer, QuantReport};
use crate::error::{ExportError, Result};
use crate::onnx::{load_model, save_model};

/// Scratch copy written next to the model being quantized
pub const TEMP_MODEL_NAME: &str = "temp.onnx";

/// Quantize the model at `path`, overwriting it
///
/// The model is copied to a sibling `temp.onnx`, quantized from there and
/// written back to `path`. The scratch file is removed on success and left in
/// place if any step fails.
pub fn quantize_file(path: &Path, config: &DynamicQuantConfig) -> Result<QuantReport> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let temp = dir.join(TEMP_MODEL_NAME);

    std::fs::copy(path, &temp).map_err(|e| {
        ExportError::io(
            format!("copying {} to {}", path.display(), temp.display()),
            e,
        )
    })?;

    let mut model = load_model(&temp)?;
    let report = DynamicQuantizer::new(*config).quantize(&mut model)?;
    let bytes = save_model(&model, path)?;

    std::fs::remove_file(&temp)
        .map_err(|e| ExportError::io(format!("removing {}", temp.display()), e))?;

    tracing::info!(
        path = %path.display(),
        bytes,
        weights = report.weights_quantized,
        "quantized model"
    );
    Ok(report)
}
