//! Migrate command (create stream tables).

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use tracing::info;

use crate::output::{print_output, print_success, OutputFormat};

use super::CommandContext;

/// Migrate command.
#[derive(Debug, Args)]
pub struct MigrateCommand {
    /// Stream names to create (e.g. bank_account).
    #[arg(required = true)]
    streams: Vec<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct StreamRow {
    #[tabled(rename = "Stream")]
    stream: String,

    #[tabled(rename = "Table")]
    table: String,
}

impl MigrateCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let registry = ctx.registry(&self.streams).await?;

        let rows: Vec<StreamRow> = registry
            .streams()
            .map(|stream| StreamRow {
                stream: stream.to_string(),
                table: format!("es_{stream}"),
            })
            .collect();
        info!(streams = rows.len(), "migrated event streams");

        if matches!(ctx.format, OutputFormat::Table) {
            print_success(&format!("{} stream(s) ready", rows.len()));
        }
        print_output(&rows, ctx.format);
        Ok(())
    }
}
