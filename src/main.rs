use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use tradewire::cli::{parse_args, run_cli_command};
use tradewire::config::ClientConfig;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // Logs go to stderr; stdout carries the JSON event stream.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let command = parse_args(std::env::args());
    run_cli_command(command, ClientConfig::from_env()).await
}
