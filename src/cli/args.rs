//! Command-line argument parsing for the tradewire CLI.
//!
//! This module handles parsing command-line arguments and determining
//! which CLI command to execute.

use crate::stream::JSON_DECODER;

/// Options for streaming one or more endpoints.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunOptions {
    /// Endpoint paths to open, in order
    pub endpoints: Vec<String>,
    /// Subscription message sent on every open
    pub subscribe: Option<String>,
    /// Decoder tag for every endpoint
    pub decoder: Option<String>,
}

/// Parsed CLI command to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Show version information
    Version,
    /// Show usage
    Help,
    /// Stream the given endpoints (default)
    Run(RunOptions),
    /// The arguments could not be parsed
    Invalid(String),
}

/// Parse command-line arguments and return the appropriate command.
///
/// # Arguments
///
/// * `args` - Iterator of command-line arguments (typically `std::env::args()`)
///
/// # Examples
///
/// ```
/// use tradewire::cli::args::{parse_args, CliCommand};
///
/// let args = vec!["tradewire".to_string(), "--version".to_string()];
/// assert_eq!(parse_args(args.into_iter()), CliCommand::Version);
/// ```
pub fn parse_args<I>(args: I) -> CliCommand
where
    I: Iterator<Item = String>,
{
    let mut options = RunOptions::default();
    // Skip the program name
    let mut args = args.skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => return CliCommand::Version,
            "--help" | "-h" => return CliCommand::Help,
            "--endpoint" | "-e" => match args.next() {
                Some(endpoint) => options.endpoints.push(endpoint),
                None => return CliCommand::Invalid("--endpoint requires a path".to_string()),
            },
            "--subscribe" | "-s" => match args.next() {
                Some(message) => options.subscribe = Some(message),
                None => return CliCommand::Invalid("--subscribe requires a message".to_string()),
            },
            "--decoder" | "-d" => match args.next() {
                Some(tag) => options.decoder = Some(tag),
                None => return CliCommand::Invalid("--decoder requires a tag".to_string()),
            },
            other => return CliCommand::Invalid(format!("unknown argument '{}'", other)),
        }
    }

    if options.endpoints.is_empty() {
        return CliCommand::Invalid("at least one --endpoint is required".to_string());
    }
    CliCommand::Run(options)
}

/// Usage text for `--help` and argument errors.
pub fn usage() -> String {
    format!(
        "Usage: tradewire --endpoint PATH [--endpoint PATH]... [--subscribe MSG] [--decoder TAG]\n\
         \n\
         Streams each endpoint and prints every decoded message as a JSON line.\n\
         The long-lived credential is read from TRADEWIRE_ID_TOKEN.\n\
         Decoders: {} (default), text",
        JSON_DECODER
    )
}
