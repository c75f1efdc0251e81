//! smap CLI - content negotiation and freshness diagnostics.
//!
//! Provides commands for:
//! - `negotiate`: Pick the representation a client's `Accept*` headers select
//! - `freshness`: Aggregate file modification times and answer a conditional request

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{FreshnessArgs, NegotiateArgs};
use output::Output;

/// smap - sitemap publishing primitives.
#[derive(Parser)]
#[command(name = "smap", version, about)]
struct Cli {
    /// Enable verbose output (cache and negotiation logs).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Negotiate media type, charset and language.
    Negotiate(NegotiateArgs),
    /// Check freshness of files for a conditional request.
    Freshness(FreshnessArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if cli.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Negotiate(args) => args.execute(),
        Commands::Freshness(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
