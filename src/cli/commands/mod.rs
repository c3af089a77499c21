//! CLI command implementations

mod export;


use crate::cli::LogLevel;
use crate::config::{Cli, ExportConfig};
use crate::error::Result;

/// Execute the export based on the parsed arguments
pub fn run_command(cli: Cli) -> Result<()> {
    // Configure output based on verbose/quiet flags
    let log_level = LogLevel::from_flags(cli.verbose, cli.quiet);

    let config = ExportConfig::try_from(&cli)?;
    export::run_export(&config, log_level)?;
    Ok(())
}
