//! Export result types.

use std::path::PathBuf;

use crate::dataset::ImageSize;

/// One written artifact
#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    /// Output path
    pub path: PathBuf,
    /// Dataset image size the artifact was exported for
    pub image_size: ImageSize,
    /// File size in bytes
    pub size_bytes: u64,
    /// Nodes in the graph
    pub num_nodes: usize,
    /// Initializers in the graph
    pub num_initializers: usize,
    /// Whether weights were rewritten to 8-bit
    pub quantized: bool,
}

impl ExportResult {
    /// Format size as human-readable string
    #[must_use]
    pub fn size_human(&self) -> String {
        if self.size_bytes >= 1_000_000_000 {
            format!("{:.2} GB", self.size_bytes as f64 / 1e9)
        } else if self.size_bytes >= 1_000_000 {
            format!("{:.2} MB", self.size_bytes as f64 / 1e6)
        } else if self.size_bytes >= 1_000 {
            format!("{:.2} KB", self.size_bytes as f64 / 1e3)
        } else {
            format!("{} B", self.size_bytes)
        }
    }
}
