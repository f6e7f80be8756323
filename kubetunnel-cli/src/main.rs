//! kubetunnel - forward local ports to pods behind Kubernetes services.

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use tracing_subscriber::EnvFilter;

/// Initialize tracing to stderr.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` with `--verbose`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Err(e) = tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .try_init()
    {
        eprintln!("Failed to initialize tracing: {}", e);
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let result = match cli.command {
        Commands::Forward(args) => commands::forward::execute(args, &cli.global).await,
        Commands::Pod(args) => commands::pod::execute(args, &cli.global).await,
        Commands::Resolve(args) => commands::resolve::execute(args, &cli.global).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
