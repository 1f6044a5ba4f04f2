//! Account command (bank-account reference aggregate).

use aggstore_store::{PgBackend, Session};
use aggstore_testing::bank_account::{self, AccountEvent, AccountStore, STREAM};
use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::output::{print_single, print_success, OutputFormat};

use super::CommandContext;

/// Account command.
#[derive(Debug, Args)]
pub struct AccountCommand {
    #[command(subcommand)]
    command: AccountSubcommand,
}

#[derive(Debug, Subcommand)]
enum AccountSubcommand {
    /// Deposit into an account.
    Deposit(AmountArgs),

    /// Withdraw from an account.
    Withdraw(AmountArgs),

    /// Show an account's balance.
    Balance(BalanceArgs),
}

#[derive(Debug, Args)]
struct AmountArgs {
    /// Account id.
    account_id: String,

    /// Amount to move.
    amount: i64,
}

#[derive(Debug, Args)]
struct BalanceArgs {
    /// Account id.
    account_id: String,
}

#[derive(Debug, Serialize)]
struct AccountView {
    account_id: String,
    balance: i64,
    version: i32,
}

impl AccountCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let registry = ctx.registry(&[STREAM.to_string()]).await?;
        let accounts = bank_account::from_registry(&registry, ctx.context.clone())?
            .with_retry_policy(ctx.retry_policy());

        match self.command {
            AccountSubcommand::Deposit(args) => {
                let event = AccountEvent::Deposit(args.amount);
                write(&ctx, &accounts, &args.account_id, event).await
            }
            AccountSubcommand::Withdraw(args) => {
                let event = AccountEvent::Withdrawal(args.amount);
                write(&ctx, &accounts, &args.account_id, event).await
            }
            AccountSubcommand::Balance(args) => {
                let view = view(&accounts, &args.account_id).await?;
                print_view(&view, ctx.format);
                Ok(())
            }
        }
    }
}

async fn write(
    ctx: &CommandContext,
    accounts: &AccountStore<PgBackend>,
    account_id: &str,
    event: AccountEvent,
) -> Result<()> {
    // Apply and read back inside one transaction so the reported version is
    // the one this write produced.
    let mut session = accounts.begin().await?;
    let state = accounts.apply(account_id, event, Some(&mut session)).await?;
    let version = accounts
        .version(account_id, Some(&mut session))
        .await?
        .map_or(0, |v| v.value());
    session.commit().await?;

    let view = AccountView {
        account_id: account_id.to_string(),
        balance: state.balance,
        version,
    };
    if matches!(ctx.format, OutputFormat::Table) {
        print_success(&format!("account {account_id} at version {version}"));
    }
    print_view(&view, ctx.format);
    Ok(())
}

async fn view(accounts: &AccountStore<PgBackend>, account_id: &str) -> Result<AccountView> {
    let mut session = accounts.begin().await?;
    let state = accounts.load(account_id, Some(&mut session)).await?;
    let version = accounts
        .version(account_id, Some(&mut session))
        .await?
        .map_or(0, |v| v.value());
    session.commit().await?;

    Ok(AccountView {
        account_id: account_id.to_string(),
        balance: state.balance,
        version,
    })
}

fn print_view(view: &AccountView, format: OutputFormat) {
    match format {
        OutputFormat::Table => println!("{}: balance {}", view.account_id, view.balance),
        OutputFormat::Json => print_single(view, format),
    }
}
