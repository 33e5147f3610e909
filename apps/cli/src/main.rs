//! xmlscrub CLI: repair pipeline for Archivist XML exports.
//!
//! Un-escapes double-escaped entities, fixes malformed character reference
//! terminators, and collapses line breaks inside XML text, in place.

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
