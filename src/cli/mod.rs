//! CLI module for tradewire.
//!
//! This module provides command-line interface functionality including:
//! - Argument parsing
//! - Version display
//! - The headless streaming command
//!
//! # Usage
//!
//! ```ignore
//! use tradewire::cli::{parse_args, run_cli_command};
//!
//! let command = parse_args(std::env::args());
//! run_cli_command(command, ClientConfig::from_env()).await?;
//! ```

pub mod args;
pub mod stream;
pub mod version;

pub use args::{parse_args, usage, CliCommand, RunOptions};
pub use stream::{event_to_json, run_streams, ID_TOKEN_ENV};
pub use version::{handle_version_command, VERSION};

use color_eyre::eyre::eyre;
use color_eyre::Result;

use crate::config::ClientConfig;

/// Run a parsed CLI command to completion.
pub async fn run_cli_command(command: CliCommand, config: ClientConfig) -> Result<()> {
    match command {
        CliCommand::Version => {
            handle_version_command();
            Ok(())
        }
        CliCommand::Help => {
            println!("{}", usage());
            Ok(())
        }
        CliCommand::Run(options) => run_streams(config, options).await,
        CliCommand::Invalid(reason) => Err(eyre!("{}\n\n{}", reason, usage())),
    }
}
