mod address;
mod auth;
mod cli;
mod config;
mod error;
mod lifecycle;
mod notify;
mod output;
mod providers;
mod reconcile;
mod report;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    output::print_banner();

    let cli = Cli::parse();
    info!("Starting opsweep - operational housekeeping");
    cli.execute().await?;

    Ok(())
}
