//! Error types for checkpoint export
//!
//! Every failure is fatal for the run; variants carry enough context to tell
//! the user which input to fix.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for export operations
pub type Result<T> = std::result::Result<T, ExportError>;

/// Errors that can occur while exporting a checkpoint
#[derive(Debug, Error)]
pub enum ExportError {
    /// Model type key is not in the registry
    #[error("Unknown model type '{model_type}'\n  → Supported model types: {supported}")]
    UnknownModelType { model_type: String, supported: String },

    /// Requested opset cannot express the exported graph
    #[error("Unsupported opset version {version}\n  → Supported range: {min}..={max}")]
    UnsupportedOpset { version: i64, min: i64, max: i64 },

    /// IO error with context
    #[error("IO error: {context}\n  Cause: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Image header could not be read
    #[error("Failed to read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// Checkpoint file could not be parsed
    #[error("Failed to load checkpoint {path}: {message}")]
    Checkpoint { path: PathBuf, message: String },

    /// Checkpoint extension is not recognized
    #[error("Unsupported checkpoint format: {path}\n  → Use a .pth, .pt, .bin or .safetensors file")]
    UnsupportedCheckpoint { path: PathBuf },

    /// Required tensor absent from the checkpoint
    #[error("Checkpoint is missing tensor '{name}'\n  → Check that --checkpoint-path points at a Segment Anything checkpoint")]
    MissingTensor { name: String },

    /// Tensor shape mismatch
    #[error("Tensor shape mismatch for {tensor}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        tensor: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Checkpoint was trained for a different encoder variant
    #[error("Checkpoint does not match model type '{model_type}': image encoder width is {actual}, expected {expected}\n  → Pass the --model_type the checkpoint was released for")]
    VariantMismatch {
        model_type: String,
        expected: usize,
        actual: usize,
    },

    /// ONNX protobuf decoding failed
    #[error("Failed to decode ONNX model {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: prost::DecodeError,
    },

    /// Graph construction or rewriting hit an inconsistency
    #[error("Invalid graph: {message}")]
    Graph { message: String },
}

impl ExportError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a graph error
    pub fn graph(message: impl Into<String>) -> Self {
        Self::Graph {
            message: message.into(),
        }
    }

    /// Check if the error was caused by user input rather than a bug
    #[must_use]
    pub fn is_user_error(&self) -> bool {
        !matches!(self, Self::Graph { .. })
    }

    /// Stable code for the error category
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownModelType { .. } => "E001",
            Self::UnsupportedOpset { .. } => "E002",
            Self::Io { .. } => "E010",
            Self::Image { .. } => "E011",
            Self::Checkpoint { .. } => "E020",
            Self::UnsupportedCheckpoint { .. } => "E021",
            Self::MissingTensor { .. } => "E022",
            Self::ShapeMismatch { .. } => "E023",
            Self::VariantMismatch { .. } => "E024",
            Self::Decode { .. } => "E030",
            Self::Graph { .. } => "E999",
        }
    }
}
