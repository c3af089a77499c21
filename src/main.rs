//! sam-onnx-export CLI
//!
//! # Usage
//!
//! ```bash
//! # Export the default vit_h checkpoint for every image size in ./dataset/images
//! sam-onnx-export --checkpoint-path sam_vit_h_4b8939.pth
//!
//! # Smaller variant, quantized, custom output directory
//! sam-onnx-export --model_type vit_b --checkpoint-path sam_vit_b_01ec64.pth \
//!     --onnx-models-path ./onnx --quantize
//! ```

use clap::Parser;
use sam_onnx_export::cli::{init_tracing, run_command, Cli, LogLevel};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(LogLevel::from_flags(cli.verbose, cli.quiet));

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
