//! CLI commands.

mod account;
mod events;
mod migrate;

use aggstore_events::EventContext;
use aggstore_id::CorrelationId;
use aggstore_store::{Database, DbConfig, PgBackend, RetryPolicy, StreamRegistry};
use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::output::OutputFormat;

/// aggctl - manage aggstore event streams.
#[derive(Debug, Parser)]
#[command(name = "aggctl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (table or json).
    #[arg(long, global = true, default_value = "table")]
    format: String,

    /// Postgres connection URL.
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Tenant stamped on written events.
    #[arg(long, global = true, env = "AGGSTORE_TENANT", default_value = "default")]
    tenant: String,

    /// Principal stamped on written events.
    #[arg(long, global = true, env = "AGGSTORE_PRINCIPAL", default_value = "aggctl")]
    principal: String,

    /// Correlation id stamped on written events. Generated if omitted.
    #[arg(long, global = true, env = "AGGSTORE_CORRELATION")]
    correlation: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the tables and indexes for event streams.
    Migrate(migrate::MigrateCommand),

    /// Show the event log of one aggregate.
    Events(events::EventsCommand),

    /// Drive the bank-account reference aggregate.
    Account(account::AccountCommand),

    /// Show CLI version.
    Version,
}

impl Cli {
    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let format = match self.format.as_str() {
            "json" => OutputFormat::Json,
            _ => OutputFormat::Table,
        };

        let mut db_config = DbConfig::from_env();
        if let Some(url) = self.database_url {
            db_config.url = url;
        }

        let context = EventContext::new(
            self.correlation
                .unwrap_or_else(|| CorrelationId::new().to_string()),
            self.principal,
            self.tenant,
        );

        let ctx = CommandContext {
            format,
            db_config,
            context,
        };

        match self.command {
            Commands::Migrate(cmd) => cmd.run(ctx).await,
            Commands::Events(cmd) => cmd.run(ctx).await,
            Commands::Account(cmd) => cmd.run(ctx).await,
            Commands::Version => {
                println!("aggctl {}", env!("CARGO_PKG_VERSION"));
                Ok(())
            }
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub format: OutputFormat,
    pub db_config: DbConfig,
    pub context: EventContext,
}

impl CommandContext {
    /// Connect and register `streams`, creating their tables.
    pub async fn registry(&self, streams: &[String]) -> Result<StreamRegistry<PgBackend>> {
        let db = Database::connect(&self.db_config).await?;
        let mut registry = StreamRegistry::new(db.backend());
        for stream in streams {
            registry.register(stream)?;
        }
        registry.init().await?;
        Ok(registry)
    }

    /// Retry policy for writes, with `AGGSTORE_RETRY_*` overrides.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from_env()
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_account_deposit() {
        let cli = Cli::try_parse_from([
            "aggctl",
            "--tenant",
            "tnt_acme",
            "account",
            "deposit",
            "acct-1",
            "25",
        ])
        .unwrap();
        assert_eq!(cli.tenant, "tnt_acme");
        assert!(matches!(cli.command, Commands::Account(_)));
    }

    #[test]
    fn test_migrate_requires_a_stream() {
        assert!(Cli::try_parse_from(["aggctl", "migrate"]).is_err());
    }
}
