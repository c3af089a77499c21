//! Checkpoint loading
//!
//! PyTorch archives go through candle's pickle reader, which only rebuilds
//! tensor storage and never executes pickled code. SafeTensors files are parsed
//! with the `safetensors` crate.

use std::path::Path;

use candle_core::pickle::PthTensors;
use candle_core::DType;
use safetensors::tensor::Dtype;
use safetensors::SafeTensors;

use super::format::CheckpointFormat;
use super::weights::StateDict;
use crate::error::{ExportError, Result};

/// Load a checkpoint, detecting the format from the file extension
///
/// # Example
///
/// ```no_run
/// use sam_onnx_export::checkpoint::load_state_dict;
///
/// let sd = load_state_dict("sam_vit_h_4b8939.pth").expect("failed to load checkpoint");
/// println!("{} tensors", sd.len());
/// ```
pub fn load_state_dict(path: impl AsRef<Path>) -> Result<StateDict> {
    load_state_dict_with(path, |_| true)
}

/// Load a checkpoint, converting only the tensors `keep` accepts
///
/// Rejected tensors are never widened to `f32`; their shapes are still
/// recorded so they can be inspected through [`TensorSource::shape_of`].
///
/// [`TensorSource::shape_of`]: super::TensorSource::shape_of
pub fn load_state_dict_with<F>(path: impl AsRef<Path>, keep: F) -> Result<StateDict>
where
    F: Fn(&str) -> bool,
{
    let path = path.as_ref();
    let format =
        CheckpointFormat::from_path(path).ok_or_else(|| ExportError::UnsupportedCheckpoint {
            path: path.to_path_buf(),
        })?;

    if !path.exists() {
        return Err(ExportError::io(
            format!("opening checkpoint {}", path.display()),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
    }

    let sd = match format {
        CheckpointFormat::PyTorch => load_pickle(path, &keep)?,
        CheckpointFormat::SafeTensors => load_safetensors(path, &keep)?,
    };

    if sd.shapes.is_empty() {
        return Err(ExportError::Checkpoint {
            path: path.to_path_buf(),
            message: "no tensors found".to_string(),
        });
    }

    tracing::debug!(
        format = %format,
        tensors = sd.len(),
        skipped = sd.shapes.len() - sd.len(),
        params = sd.param_count(),
        "loaded checkpoint"
    );
    Ok(sd)
}

fn checkpoint_error(path: &Path, err: impl std::fmt::Display) -> ExportError {
    ExportError::Checkpoint {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

/// Load a `torch.save` state dict; storage is only read for kept tensors
fn load_pickle(path: &Path, keep: &dyn Fn(&str) -> bool) -> Result<StateDict> {
    let pth = PthTensors::new(path, None).map_err(|e| checkpoint_error(path, e))?;

    let mut sd = StateDict::new();
    for (name, info) in pth.tensor_infos() {
        let shape = info.layout.shape().dims().to_vec();
        if !keep(name.as_str()) {
            sd.add_shape(name.clone(), shape);
            continue;
        }
        let tensor = pth
            .get(name)
            .map_err(|e| checkpoint_error(path, format!("tensor {name}: {e}")))?
            .ok_or_else(|| checkpoint_error(path, format!("tensor {name} has no storage")))?;
        let data = tensor
            .to_dtype(DType::F32)
            .and_then(|t| t.flatten_all())
            .and_then(|t| t.to_vec1::<f32>())
            .map_err(|e| checkpoint_error(path, format!("tensor {name}: {e}")))?;
        sd.add_tensor(name.clone(), data, shape);
    }
    Ok(sd)
}

/// Load a SafeTensors file; floating point tensors are widened to f32
fn load_safetensors(path: &Path, keep: &dyn Fn(&str) -> bool) -> Result<StateDict> {
    let bytes = std::fs::read(path)
        .map_err(|e| ExportError::io(format!("reading checkpoint {}", path.display()), e))?;
    let tensors = SafeTensors::deserialize(&bytes).map_err(|e| checkpoint_error(path, e))?;

    let mut sd = StateDict::new();
    for (name, view) in tensors.tensors() {
        if !keep(name.as_str()) {
            sd.add_shape(name, view.shape().to_vec());
            continue;
        }
        let raw = view.data();
        let data: Vec<f32> = match view.dtype() {
            Dtype::F32 => raw
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
            Dtype::F16 => raw
                .chunks_exact(2)
                .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect(),
            Dtype::BF16 => raw
                .chunks_exact(2)
                .map(|c| half::bf16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect(),
            other => {
                tracing::debug!(tensor = %name, dtype = ?other, "skipping non-float tensor");
                continue;
            }
        };
        sd.add_tensor(name, data, view.shape().to_vec());
    }
    Ok(sd)
}
