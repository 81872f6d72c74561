//! Binary entry point for the `rfp-agent` CLI.

use anyhow::Result;
use clap::Parser;
use rfp_agent_rs::cli::{Cli, run};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "rfp_agent_rs=debug"
    } else {
        "rfp_agent_rs=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    run(cli).await
}
