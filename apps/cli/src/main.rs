//! TenderWatch CLI: monthly public-tender monitoring.
//!
//! Downloads the monthly procurement archive, keeps the tenders that match
//! the configured criteria and enriches them through Gemini.

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
