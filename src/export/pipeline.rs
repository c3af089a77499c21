//! Scan-export-quantize pipeline
//!
//! Runs the whole tool for a validated configuration:
//! 1. Discover the distinct image sizes of the dataset
//! 2. Export one model per size
//! 3. Optionally quantize each model in place

use std::collections::BTreeSet;

use super::exporter::Exporter;
use super::result::ExportResult;
use crate::config::ExportConfig;
use crate::dataset::{scan_image_sizes, ImageSize};
use crate::error::{ExportError, Result};
use crate::quant::{quantize_file, DynamicQuantConfig};

/// Progress notifications emitted while the pipeline runs
#[derive(Debug, Clone, PartialEq)]
pub enum Progress<'a> {
    /// Dataset scanned
    Scanned { sizes: &'a BTreeSet<ImageSize> },
    /// Model written for one size
    Exported(&'a ExportResult),
    /// Model rewritten with quantized weights
    Quantized(&'a ExportResult),
}

/// Outcome of a pipeline run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    /// Distinct sizes found in the dataset, ascending
    pub sizes: Vec<ImageSize>,
    /// One entry per written artifact, in size order
    pub artifacts: Vec<ExportResult>,
}

impl PipelineReport {
    /// Total bytes written
    #[must_use]
    pub fn total_bytes(&self) -> u64 {
        self.artifacts.iter().map(|a| a.size_bytes).sum()
    }
}

/// Run the pipeline without progress reporting
pub fn run(config: &ExportConfig) -> Result<PipelineReport> {
    run_with_progress(config, |_| {})
}

/// Run the pipeline, reporting each step to `on_progress`
pub fn run_with_progress<F>(config: &ExportConfig, mut on_progress: F) -> Result<PipelineReport>
where
    F: FnMut(Progress<'_>),
{
    config.validate()?;

    std::fs::create_dir_all(&config.output_dir).map_err(|e| {
        ExportError::io(
            format!("creating output directory {}", config.output_dir.display()),
            e,
        )
    })?;

    let sizes = scan_image_sizes(&config.dataset_path)?;
    on_progress(Progress::Scanned { sizes: &sizes });

    let exporter = Exporter::new()
        .output_dir(&config.output_dir)
        .opset(config.opset_version);
    let quant_config = DynamicQuantConfig::default();

    let mut report = PipelineReport {
        sizes: sizes.iter().copied().collect(),
        artifacts: Vec::with_capacity(sizes.len()),
    };

    for &size in &sizes {
        let mut result = exporter.export(&config.checkpoint_path, &config.model_type, size)?;
        on_progress(Progress::Exported(&result));

        if config.quantize {
            quantize_file(&result.path, &quant_config)?;
            result.size_bytes = std::fs::metadata(&result.path)
                .map_err(|e| ExportError::io(format!("reading {}", result.path.display()), e))?
                .len();
            result.quantized = true;
            on_progress(Progress::Quantized(&result));
        }
        report.artifacts.push(result);
    }

    tracing::info!(
        artifacts = report.artifacts.len(),
        bytes = report.total_bytes(),
        "pipeline finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(root: &std::path::Path) -> ExportConfig {
        ExportConfig {
            checkpoint_path: root.join("sam.safetensors"),
            model_type: "default".to_string(),
            output_dir: root.join("models"),
            dataset_path: root.join("dataset"),
            opset_version: 15,
            quantize: false,
        }
    }

    #[test]
    fn test_empty_dataset_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        std::fs::create_dir_all(cfg.dataset_path.join("images")).unwrap();

        let mut events = 0;
        let report = run_with_progress(&cfg, |_| events += 1).unwrap();
        assert!(report.sizes.is_empty());
        assert!(report.artifacts.is_empty());
        assert_eq!(events, 1);
        assert!(cfg.output_dir.exists());
        assert_eq!(std::fs::read_dir(&cfg.output_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_invalid_config_touches_nothing() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = config(tmp.path());
        cfg.model_type = "vit_x".to_string();
        assert!(matches!(
            run(&cfg),
            Err(ExportError::UnknownModelType { .. })
        ));
        assert!(!cfg.output_dir.exists());
    }

    #[test]
    fn test_missing_dataset_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(tmp.path());
        assert!(matches!(run(&cfg), Err(ExportError::Io { .. })));
    }
}
