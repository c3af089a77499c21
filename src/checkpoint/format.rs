//! Checkpoint format detection.

use std::path::Path;

/// On-disk checkpoint formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointFormat {
    /// `torch.save` pickle archive
    PyTorch,
    /// SafeTensors
    SafeTensors,
}

impl CheckpointFormat {
    /// Detect format from file path
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".safetensors") {
            Some(Self::SafeTensors)
        } else if name.ends_with(".pth")
            || name.ends_with(".pt")
            || name.ends_with(".bin")
            || name.ends_with(".ckpt")
        {
            Some(Self::PyTorch)
        } else {
            None
        }
    }
}

impl std::fmt::Display for CheckpointFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PyTorch => write!(f, "PyTorch"),
            Self::SafeTensors => write!(f, "SafeTensors"),
        }
    }
}
