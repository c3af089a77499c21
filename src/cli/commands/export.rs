//! Export command implementation

use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::ExportConfig;
use crate::error::Result;
use crate::export::{run_with_progress, PipelineReport, Progress};

/// Run the export pipeline and print progress at `level`
pub fn run_export(config: &ExportConfig, level: LogLevel) -> Result<PipelineReport> {
    log(
        level,
        LogLevel::Verbose,
        &format!(
            "Exporting {} ({}) at opset {}",
            config.checkpoint_path.display(),
            config.model_type,
            config.opset_version
        ),
    );

    let report = run_with_progress(config, |event| match event {
        Progress::Scanned { sizes } => {
            log(
                level,
                LogLevel::Normal,
                &format!(
                    "Found {} distinct image size(s) in {}",
                    sizes.len(),
                    config.dataset_path.display()
                ),
            );
            for size in sizes {
                log(level, LogLevel::Verbose, &format!("  {}x{}", size.width, size.height));
            }
        }
        Progress::Exported(result) => {
            log(
                level,
                LogLevel::Normal,
                &format!("Exported {} ({})", result.path.display(), result.size_human()),
            );
            log(
                level,
                LogLevel::Verbose,
                &format!(
                    "  {} nodes, {} initializers",
                    result.num_nodes, result.num_initializers
                ),
            );
        }
        Progress::Quantized(result) => {
            log(
                level,
                LogLevel::Normal,
                &format!("Quantized {} ({})", result.path.display(), result.size_human()),
            );
        }
    })?;

    if report.artifacts.is_empty() {
        log(level, LogLevel::Normal, "No images found, nothing exported");
    } else {
        log(
            level,
            LogLevel::Normal,
            &format!(
                "Wrote {} model(s) to {}",
                report.artifacts.len(),
                config.output_dir.display()
            ),
        );
    }
    Ok(report)
}
