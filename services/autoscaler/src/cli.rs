use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::error;

/// Exit status for an invalid invocation.
pub const USAGE_EXIT_CODE: i32 = 2;

#[derive(Debug, Parser)]
#[command(name = "autoscaler", version, about = "CPU-driven replica autoscaler")]
pub struct Args {
    /// Path to the YAML config file.
    #[arg(long, value_name = "PATH")]
    pub config: PathBuf,
}

impl Args {
    /// Parse the process arguments, logging a usage error and exiting on an
    /// invalid invocation.
    pub fn parse_or_exit() -> Self {
        match Self::try_parse() {
            Ok(args) => args,
            Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                err.exit()
            }
            Err(err) => {
                error!(
                    error = %err.render(),
                    "Usage: autoscaler --config <path>"
                );
                std::process::exit(USAGE_EXIT_CODE);
            }
        }
    }
}
