//! Tactician CLI entry point.

use clap::Parser;

use tactician::cli::{self, Cli};
use tactician::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json_mode = cli.json;

    let config = match cli::load_config(&cli) {
        Ok(config) => config,
        Err(err) => cli::handle_error(&err, json_mode),
    };

    let _logger = match LogConfig::try_from(&config.logging).and_then(|c| LoggerImpl::init(&c)) {
        Ok(logger) => logger,
        Err(err) => cli::handle_error(&err, json_mode),
    };

    if let Err(err) = cli::dispatch(cli.command, &config, json_mode).await {
        cli::handle_error(&err, json_mode);
    }
}
