//! ONNX model representation, construction and file IO
//!
//! - `proto`: protobuf message types (prost)
//! - `tensor`: tensor and value-info helpers
//! - `builder`: graph construction with scoped names
//! - `optimize`: graph clean-up passes run before quantization

pub mod builder;
pub mod optimize;
pub mod proto;
pub mod tensor;

pub use builder::GraphBuilder;
pub use proto::{DataType, GraphProto, ModelProto, NodeProto, TensorProto, ValueInfoProto};
pub use tensor::Dim;

use crate::error::{ExportError, Result};
use prost::Message;
use std::path::Path;

/// Producer name stamped into exported models
pub const PRODUCER_NAME: &str = "sam-onnx-export";

/// Lowest opset the exported graph can be expressed in
pub const MIN_OPSET: i64 = 13;

/// Highest opset the exporter emits
pub const MAX_OPSET: i64 = 18;

/// IR version released alongside an opset
#[must_use]
pub fn ir_version_for_opset(opset: i64) -> i64 {
    if opset >= 15 {
        8
    } else {
        7
    }
}

/// Validate a requested opset version
pub fn check_opset(opset: i64) -> Result<i64> {
    if (MIN_OPSET..=MAX_OPSET).contains(&opset) {
        Ok(opset)
    } else {
        Err(ExportError::UnsupportedOpset {
            version: opset,
            min: MIN_OPSET,
            max: MAX_OPSET,
        })
    }
}

/// Read and decode a model file
pub fn load_model(path: impl AsRef<Path>) -> Result<ModelProto> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| ExportError::io(format!("reading {}", path.display()), e))?;
    ModelProto::decode(bytes.as_slice()).map_err(|source| ExportError::Decode {
        path: path.to_path_buf(),
        source,
    })
}

/// Encode and write a model file, returning the number of bytes written
pub fn save_model(model: &ModelProto, path: impl AsRef<Path>) -> Result<u64> {
    let path = path.as_ref();
    let bytes = model.encode_to_vec();
    std::fs::write(path, &bytes)
        .map_err(|e| ExportError::io(format!("writing {}", path.display()), e))?;
    Ok(bytes.len() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_check_opset_bounds() {
        assert!(check_opset(MIN_OPSET).is_ok());
        assert!(check_opset(15).is_ok());
        assert!(check_opset(MAX_OPSET).is_ok());
        assert!(matches!(
            check_opset(11),
            Err(ExportError::UnsupportedOpset { version: 11, .. })
        ));
        assert!(check_opset(MAX_OPSET + 1).is_err());
    }

    #[test]
    fn test_ir_version_for_opset() {
        assert_eq!(ir_version_for_opset(13), 7);
        assert_eq!(ir_version_for_opset(14), 7);
        assert_eq!(ir_version_for_opset(15), 8);
        assert_eq!(ir_version_for_opset(18), 8);
    }

    #[test]
    fn test_save_then_load_model() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("m.onnx");

        let mut g = GraphBuilder::new("main_graph", 15);
        let y = g.unary("Relu", "x");
        g.rename(&y, "y");
        g.input("x", DataType::Float, &Dim::fixed(&[1, 4]));
        g.output("y", DataType::Float, &Dim::fixed(&[1, 4]));
        let model = g.build_model(vec![]);

        let written = save_model(&model, &path).unwrap();
        assert_eq!(written, std::fs::metadata(&path).unwrap().len());
        assert_eq!(load_model(&path).unwrap(), model);
    }

    #[test]
    fn test_load_model_rejects_garbage() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("bad.onnx");
        std::fs::write(&path, [0xffu8, 0xff, 0xff]).unwrap();
        assert!(matches!(
            load_model(&path),
            Err(ExportError::Decode { .. })
        ));
    }
}
