//! aggctl - operator CLI for aggstore event streams
//!
//! Creates stream tables, inspects aggregate event logs, and drives the
//! bank-account reference aggregate against a live database.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod commands;
mod error;
mod output;

use commands::Cli;

fn init_tracing() {
    // Prefer RUST_LOG, fallback to AGGSTORE_LOG_LEVEL. Logs go to stderr so
    // stdout stays clean for command output.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        std::env::var("AGGSTORE_LOG_LEVEL")
            .unwrap_or_else(|_| "info".to_string())
            .into()
    });
    let json = std::env::var("AGGSTORE_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");

    let layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry().with(filter).with(layer).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }

    Ok(())
}
