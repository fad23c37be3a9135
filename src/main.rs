//! Kasa - Family records storage CLI
//!
//! Operator tool over the Kasa storage facade. Probes the configured
//! backends once, binds the best available, and runs one command against
//! it.
//!
//! Backend order:
//! - Remote database (`MONGODB_URI`, from the environment or `.env`)
//! - Local database on the loopback interface
//! - Embedded JSON file store under `--data-dir`
//!
//! Results are printed to stdout as JSON; logs go to stderr.

pub mod commands;

use std::sync::Arc;

use clap::Parser;
use kasa_store::constants::DATA_DIR_DEFAULT;
use kasa_store::{RecordStore, StorageFacade, StoreConfig};

use commands::Command;

// =============================================================================
// TigerStyle Constants
// =============================================================================

/// Application name
pub const APP_NAME: &str = "kasa";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// CLI
// =============================================================================

/// Kasa - family records with cascading storage fallback
#[derive(Parser, Debug)]
#[command(name = APP_NAME)]
#[command(about = "Inspect and edit Kasa records on whichever backend is available")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory for the embedded file store
    #[arg(long, default_value = DATA_DIR_DEFAULT, global = true)]
    data_dir: String,

    /// Skip the database probes and use the embedded file store
    #[arg(long, global = true)]
    embedded: bool,

    #[command(subcommand)]
    command: Command,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is normal
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .init();

    tracing::debug!("Kasa v{}", APP_VERSION);

    // Expand data directory
    let data_dir = shellexpand::tilde(&cli.data_dir).to_string();
    tracing::debug!("Data directory: {}", data_dir);

    let mut config = StoreConfig::from_env().with_data_dir(&data_dir);
    if cli.embedded {
        config = config.embedded_only();
    }

    let facade = Arc::new(StorageFacade::from_config(&config));
    let result = commands::run(cli.command, &facade).await;

    if let Err(e) = facade.close().await {
        tracing::warn!(error = %e, "failed to close storage backend");
    }

    let output = result?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
