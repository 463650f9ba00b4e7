//! frozen - frozen memory image inspector

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;
mod commands;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "frozen_image=debug,frozen_image_cli=debug"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Dump { section, output } => commands::dump(&section, output.as_deref()),
        Commands::Roundtrip { section, output } => {
            commands::roundtrip(&section, output.as_deref())
        }
        Commands::Index { section } => commands::index(&section, &mut std::io::stdout().lock()),
    }
}
