mod cli;
mod config;
mod error;
mod runner;

use clap::Parser;
use colored::Colorize;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Relayed test output owns stdout, so logging goes to stderr. Noisy
    // chromiumoxide errors are suppressed - they occur when Chrome sends CDP
    // events the library doesn't recognize (common with newer Chrome versions)
    let default_directives = if cli.verbose {
        "pagerunner=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(default_directives)
            .add_directive("chromiumoxide::conn=error".parse().unwrap())
            .add_directive("chromiumoxide::handler=error".parse().unwrap())
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match cli.run().await {
        Ok(outcome) => std::process::exit(outcome.exit_code()),
        Err(e) => {
            eprintln!("{} {}", "✗".red(), e);
            std::process::exit(1);
        }
    }
}
