//! Checkpoint to ONNX exporter.

use std::path::{Path, PathBuf};

use super::adapter::SamOnnxAdapter;
use super::dummy::DummyInputs;
use super::result::ExportResult;
use crate::checkpoint::load_state_dict_with;
use crate::dataset::ImageSize;
use crate::error::{ExportError, Result};
use crate::model::{build_sam, is_exported_tensor, lookup, Sam};
use crate::onnx::{check_opset, save_model};

/// Opset used when none is requested
pub const DEFAULT_OPSET: i64 = 15;

/// File name of the artifact for one image size
#[must_use]
pub fn artifact_name(size: ImageSize) -> String {
    format!("sam_onnx.{size}.onnx")
}

/// Writes one ONNX artifact per image size
#[derive(Debug, Clone)]
pub struct Exporter {
    output_dir: PathBuf,
    opset: i64,
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter {
    /// Create new exporter
    #[must_use]
    pub fn new() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            opset: DEFAULT_OPSET,
        }
    }

    /// Set output directory
    #[must_use]
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set target opset
    #[must_use]
    pub fn opset(mut self, opset: i64) -> Self {
        self.opset = opset;
        self
    }

    /// Path the artifact for `size` is written to
    #[must_use]
    pub fn artifact_path(&self, size: ImageSize) -> PathBuf {
        self.output_dir.join(artifact_name(size))
    }

    /// Load `checkpoint`, build `model_type` and export it for `size`
    pub fn export(&self, checkpoint: &Path, model_type: &str, size: ImageSize) -> Result<ExportResult> {
        // Reject unknown variants before touching the checkpoint
        lookup(model_type)?;
        let weights = load_state_dict_with(checkpoint, is_exported_tensor)?;
        let sam = build_sam(model_type, &weights)?;
        self.export_model(&sam, size)
    }

    /// Export an already built model for `size`
    pub fn export_model(&self, sam: &Sam, size: ImageSize) -> Result<ExportResult> {
        let opset = check_opset(self.opset)?;
        let pe = &sam.prompt_encoder;
        let dummy = DummyInputs::new(pe.embed_dim, pe.image_embedding_size);

        let metadata = vec![
            ("model_type".to_string(), sam.variant.name.to_string()),
            ("image_height".to_string(), size.height.to_string()),
            ("image_width".to_string(), size.width.to_string()),
            ("mask_threshold".to_string(), sam.mask_threshold.to_string()),
        ];
        let model = SamOnnxAdapter::new(sam, true).to_model(&dummy, opset, metadata);
        let graph = model
            .graph
            .as_ref()
            .ok_or_else(|| ExportError::graph("adapter produced no graph"))?;
        let (num_nodes, num_initializers) = (graph.node.len(), graph.initializer.len());

        let path = self.artifact_path(size);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ExportError::io(format!("creating output directory {}", parent.display()), e)
            })?;
        }
        let size_bytes = save_model(&model, &path)?;

        tracing::info!(
            path = %path.display(),
            size = %size,
            nodes = num_nodes,
            bytes = size_bytes,
            "exported model"
        );
        Ok(ExportResult {
            path,
            image_size: size,
            size_bytes,
            num_nodes,
            num_initializers,
            quantized: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::ShapeRecorder;
    use crate::onnx::load_model;
    use tempfile::TempDir;

    fn sam() -> Sam {
        Sam::from_state_dict(lookup("default").unwrap(), &ShapeRecorder::new()).unwrap()
    }

    #[test]
    fn test_artifact_name() {
        assert_eq!(artifact_name(ImageSize::new(480, 640)), "sam_onnx.480_640.onnx");
        assert_eq!(
            artifact_name(ImageSize::new(720, 1280)),
            "sam_onnx.720_1280.onnx"
        );
    }

    #[test]
    fn test_export_model_writes_file_in_new_directory() {
        let tmp = TempDir::new().unwrap();
        let out = tmp.path().join("nested").join("models");
        let exporter = Exporter::new().output_dir(&out);

        let result = exporter.export_model(&sam(), ImageSize::new(480, 640)).unwrap();
        assert_eq!(result.path, out.join("sam_onnx.480_640.onnx"));
        assert!(result.path.exists());
        assert!(result.size_bytes > 0);
        assert!(!result.quantized);

        let model = load_model(&result.path).unwrap();
        assert_eq!(model.opset_import[0].version, DEFAULT_OPSET);
        let meta: Vec<_> = model
            .metadata_props
            .iter()
            .map(|p| (p.key.as_str(), p.value.as_str()))
            .collect();
        assert!(meta.contains(&("image_height", "480")));
        assert!(meta.contains(&("model_type", "vit_h")));
    }

    #[test]
    fn test_repeated_exports_are_byte_identical() {
        let tmp = TempDir::new().unwrap();
        let sam = sam();
        let size = ImageSize::new(48, 64);

        let first = Exporter::new().output_dir(tmp.path().join("a"));
        let second = Exporter::new().output_dir(tmp.path().join("b"));
        let a = std::fs::read(first.export_model(&sam, size).unwrap().path).unwrap();
        let b = std::fs::read(second.export_model(&sam, size).unwrap().path).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unsupported_opset() {
        let tmp = TempDir::new().unwrap();
        let exporter = Exporter::new().output_dir(tmp.path()).opset(11);
        assert!(matches!(
            exporter.export_model(&sam(), ImageSize::new(4, 4)),
            Err(ExportError::UnsupportedOpset { version: 11, .. })
        ));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_unknown_model_type_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let ckpt = tmp.path().join("sam.pth");
        std::fs::write(&ckpt, b"unused").unwrap();
        let out = tmp.path().join("models");
        let exporter = Exporter::new().output_dir(&out);
        assert!(matches!(
            exporter.export(&ckpt, "vit_x", ImageSize::new(4, 4)),
            Err(ExportError::UnknownModelType { .. })
        ));
        assert!(!out.exists());
    }
}
