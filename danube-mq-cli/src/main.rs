mod config_file;
mod loopback;

use anyhow::Result;
use clap::{Parser, Subcommand};
use loopback::Loopback;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "danube-mq-cli")]
#[command(about = "A command-line tool to exercise the Danube message-queue connector")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Write records through the connector and read them back")]
    Loopback(Loopback),
}

#[tokio::main]
async fn main() -> Result<()> {
    // logs go to stderr, stdout carries the records
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Loopback(loopback) => loopback::handle_loopback(loopback).await?,
    }

    Ok(())
}
