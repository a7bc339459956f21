//! coursepress CLI: publish an enriched ebook outline to a remote CMS.
//!
//! Runs the remote-store preflight, generates topic and lesson content with
//! the configured providers, and mirrors the outline into the store.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}