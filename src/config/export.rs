//! Validated export settings

use std::path::PathBuf;

use super::args::Cli;
use crate::error::{ExportError, Result};
use crate::model::lookup;
use crate::onnx::check_opset;

/// Everything a pipeline run needs, checked before any file is touched
#[derive(Debug, Clone, PartialEq)]
pub struct ExportConfig {
    pub checkpoint_path: PathBuf,
    pub model_type: String,
    pub output_dir: PathBuf,
    pub dataset_path: PathBuf,
    pub opset_version: i64,
    pub quantize: bool,
}

impl ExportConfig {
    /// Check the model type and opset
    pub fn validate(&self) -> Result<()> {
        lookup(&self.model_type)?;
        check_opset(self.opset_version)?;
        Ok(())
    }
}

impl TryFrom<&Cli> for ExportConfig {
    type Error = ExportError;

    fn try_from(cli: &Cli) -> Result<Self> {
        let config = Self {
            checkpoint_path: cli.checkpoint_path.clone(),
            model_type: cli.model_type.clone(),
            output_dir: cli.onnx_models_path.clone(),
            dataset_path: cli.dataset_path.clone(),
            opset_version: cli.opset_version,
            quantize: cli.quantize,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_args;

    #[test]
    fn test_from_cli() {
        let cli = parse_args(["sam-onnx-export", "--quantize", "--model_type", "vit_b"]).unwrap();
        let config = ExportConfig::try_from(&cli).unwrap();
        assert_eq!(config.model_type, "vit_b");
        assert_eq!(config.output_dir, PathBuf::from("./models"));
        assert!(config.quantize);
    }

    #[test]
    fn test_unknown_model_type_rejected() {
        let cli = parse_args(["sam-onnx-export", "--model_type", "vit_huge"]).unwrap();
        assert!(matches!(
            ExportConfig::try_from(&cli),
            Err(ExportError::UnknownModelType { .. })
        ));
    }

    #[test]
    fn test_opset_out_of_range_rejected() {
        let cli = parse_args(["sam-onnx-export", "--opset-version", "9"]).unwrap();
        assert!(matches!(
            ExportConfig::try_from(&cli),
            Err(ExportError::UnsupportedOpset { version: 9, .. })
        ));
    }
}
