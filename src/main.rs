use std::io::Write;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dailyfeed::{Cli, Pipeline, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr; stdout carries the digest.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_cli(&cli, Local::now().date_naive())
        .context("Invalid configuration")?;
    tracing::debug!(settings = ?settings, "Resolved settings");

    let pipeline = Pipeline::new(settings)?;
    let digest = pipeline.run().await?;

    let json = serde_json::to_string_pretty(&digest).context("Failed to serialize digest")?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{}", json).context("Failed to write digest to stdout")?;
    Ok(())
}
