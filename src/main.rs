use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use acs_keyholder::config::{Config, LogFormat, LoggingConfig};
use acs_keyholder::invocation::Invocation;

mod cli;

use cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    init_logging(&config.logging, cli.verbose);

    let line = match cli.command_line() {
        Some(line) => line,
        None => cli::shell::read_command()?,
    };

    let outcome = Invocation::from_config(&config).run_line(&line)?;
    print!("{outcome}");
    Ok(())
}

/// Log to stderr; stdout carries only the summary. `RUST_LOG` wins over
/// `--verbose`, which wins over the configured level.
fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
