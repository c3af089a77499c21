//! Command line arguments

use clap::Parser;
use std::path::PathBuf;

/// Checkpoint released for the `vit_h` variant
pub const DEFAULT_CHECKPOINT: &str = "./sam_vit_h_4b8939.pth";
/// Model type used when none is given
pub const DEFAULT_MODEL_TYPE: &str = "default";
/// Output directory used when none is given
pub const DEFAULT_OUTPUT_DIR: &str = "./models";
/// Dataset root used when none is given
pub const DEFAULT_DATASET_PATH: &str = "./dataset";

/// Export Segment Anything checkpoints to ONNX, one model per dataset image size
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "sam-onnx-export")]
#[command(version)]
#[command(
    about = "Export a Segment Anything checkpoint to ONNX for every image size in a dataset"
)]
pub struct Cli {
    /// Path to the model checkpoint (.pth, .pt, .bin or .safetensors)
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CHECKPOINT)]
    pub checkpoint_path: PathBuf,

    /// Model variant: default, vit_h, vit_l or vit_b
    #[arg(
        long = "model_type",
        visible_alias = "model-type",
        value_name = "TYPE",
        default_value = DEFAULT_MODEL_TYPE
    )]
    pub model_type: String,

    /// Directory the ONNX models are written to
    #[arg(long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub onnx_models_path: PathBuf,

    /// Dataset root containing an `images/` directory
    #[arg(long, value_name = "DIR", default_value = DEFAULT_DATASET_PATH)]
    pub dataset_path: PathBuf,

    /// ONNX opset version to target
    #[arg(long, default_value_t = crate::export::DEFAULT_OPSET)]
    pub opset_version: i64,

    /// Quantize weights to 8-bit after export
    #[arg(long)]
    pub quantize: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

/// Parse arguments from an iterator (for testing)
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}
