//! Command-line interface.
//!
//! `nova-chat-server [--config|-c PATH] [CONFIG_FILE]`. The positional
//! file wins over the option; both default to `config.json`. Help and
//! version exit 0, argument errors exit 1.

use std::path::{Path, PathBuf};

use clap::error::ErrorKind;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    name = "nova-chat-server",
    version,
    about = "Nova Chat Server - Secure REST API Chat Backend",
    disable_version_flag = true
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short = 'c', long = "config", value_name = "PATH", default_value = "config.json")]
    pub config: PathBuf,

    /// Configuration file (overrides --config)
    #[arg(value_name = "CONFIG_FILE")]
    pub config_file: Option<PathBuf>,

    /// Show version information
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: Option<bool>,
}

impl Cli {
    /// Parse `argv`, exiting 0 for help/version and 1 for usage errors.
    pub fn parse_args() -> Self {
        match Self::try_parse() {
            Ok(cli) => cli,
            Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
                let _ = e.print();
                std::process::exit(0);
            }
            Err(e) => {
                eprintln!("Error parsing command line: {e}");
                eprintln!("Use --help for usage information");
                std::process::exit(1);
            }
        }
    }

    pub fn config_path(&self) -> &Path {
        self.config_file.as_deref().unwrap_or(&self.config)
    }
}
