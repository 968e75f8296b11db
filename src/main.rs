//! # mpdl
//!
//! Entry point of the `mpdl` command line: parses arguments, sets up logging
//! and hands the chosen subcommand to its feature handler.
use clap::{Parser, Subcommand};
use mpdl::features::save_to_local::{cli::LocalArgs, handler};
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    ///Print debug logs.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    ///Download a file in parts to a local path.
    Local(LocalArgs),
}

fn logger_init(level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy(); // respects RUST_LOG if user set it

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    human_panic::setup_panic!();
    let cli = Cli::parse();
    logger_init(if cli.verbose { Level::DEBUG } else { Level::INFO });

    match cli.command {
        Commands::Local(args) => handler::handle(args).await,
    }
}
