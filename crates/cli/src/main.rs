use std::{error::Error, time::Duration};

use clap::{Parser, Subcommand, ValueEnum};
use engine::{Amount, Engine, MergeRecord, NewAccount, RecordKind};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

mod settings;

#[derive(Parser, Debug)]
#[command(name = "supplier_merge")]
#[command(about = "Merge supplier accounts and undo merges within the undo window")]
struct Cli {
    /// Settings file, without extension (defaults to `settings` if present).
    #[arg(long)]
    config: Option<String>,

    /// Database connection string, overrides the settings file.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List accounts with their live balances.
    Accounts {
        /// Include merged away (inactive) accounts.
        #[arg(long)]
        all: bool,
    },
    /// Create a supplier account.
    AccountCreate {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "0")]
        opening_balance: Amount,
        /// The account can never be merged away.
        #[arg(long)]
        protected: bool,
    },
    /// Link an invoice or a payment to an account.
    RecordAdd {
        #[arg(long)]
        account: Uuid,
        #[arg(long, value_enum)]
        kind: KindArg,
        #[arg(long)]
        amount: Amount,
        #[arg(long)]
        reference: Option<String>,
    },
    /// Show what merging `source` into `target` would do.
    Preview { source: Uuid, target: Uuid },
    /// Merge `source` into `target`.
    Merge { source: Uuid, target: Uuid },
    /// Undo a pending merge.
    Undo { merge_id: Uuid },
    /// Merges that can still be undone.
    Pending,
    /// Every merge in the registry.
    History,
    /// Flag expired merges as permanent.
    Sweep,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum KindArg {
    Invoice,
    Payment,
}

impl From<KindArg> for RecordKind {
    fn from(value: KindArg) -> Self {
        match value {
            KindArg::Invoice => RecordKind::Invoice,
            KindArg::Payment => RecordKind::Payment,
        }
    }
}

async fn connect_db(
    database_url: &str,
) -> Result<DatabaseConnection, Box<dyn Error + Send + Sync>> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

fn print_merge(record: &MergeRecord) {
    println!(
        "{}  {} -> {}  moved {} invoices, {} payments ({})  merged {}  undo until {}{}",
        record.id,
        record.source_snapshot.name,
        record.target_account_id,
        record.moved_record_ids.invoices.len(),
        record.moved_record_ids.payments.len(),
        Amount::new(record.merged_balance),
        record.merged_at.format("%Y-%m-%d %H:%M"),
        record.undo_deadline.format("%Y-%m-%d %H:%M"),
        if record.permanent { "  [permanent]" } else { "" },
    );
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn Error + Send + Sync>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run(
    engine: &Engine,
    command: Command,
    json: bool,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    match command {
        Command::Accounts { all: false } => {
            let accounts = engine.list_accounts_with_balances().await?;
            if json {
                return print_json(&accounts);
            }
            for account in accounts {
                println!(
                    "{}  {:<32} {:>14}",
                    account.id,
                    account.name,
                    Amount::new(account.balance)
                );
            }
        }
        Command::Accounts { all: true } => {
            let accounts = engine.accounts().await?;
            if json {
                return print_json(&accounts);
            }
            for account in accounts {
                let flags = match (account.active, account.is_protected) {
                    (false, _) => "  [merged]",
                    (true, true) => "  [protected]",
                    (true, false) => "",
                };
                println!(
                    "{}  {:<32} {:>14}{flags}",
                    account.id,
                    account.name,
                    Amount::new(account.balance)
                );
            }
        }
        Command::AccountCreate {
            name,
            opening_balance,
            protected,
        } => {
            let mut input =
                NewAccount::new(name.as_str()).opening_balance(opening_balance.minor());
            if protected {
                input = input.protected();
            }
            let id = engine.new_account(input).await?;
            println!("created account: {name} ({id})");
        }
        Command::RecordAdd {
            account,
            kind,
            amount,
            reference,
        } => {
            let id = engine
                .add_record(account, kind.into(), amount.minor(), reference.as_deref())
                .await?;
            println!("linked {kind:?} {amount} to {account} ({id})");
        }
        Command::Preview { source, target } => {
            let preview = engine.merge_preview(source, target).await?;
            if json {
                return print_json(&preview);
            }
            println!(
                "source balance {}  ({} invoices, {} payments)",
                Amount::new(preview.source_balance),
                preview.invoice_count,
                preview.payment_count
            );
            println!("target balance {}", Amount::new(preview.target_balance));
            println!(
                "target after merge {}",
                Amount::new(preview.projected_target_balance)
            );
        }
        Command::Merge { source, target } => {
            let record = engine.merge(source, target).await?;
            if json {
                return print_json(&record);
            }
            print_merge(&record);
        }
        Command::Undo { merge_id } => {
            engine.undo(merge_id).await?;
            println!("undone merge {merge_id}");
        }
        Command::Pending => {
            let merges = engine.list_pending_merges().await?;
            if json {
                return print_json(&merges);
            }
            merges.iter().for_each(print_merge);
        }
        Command::History => {
            let merges = engine.list_merges().await?;
            if json {
                return print_json(&merges);
            }
            merges.iter().for_each(print_merge);
        }
        Command::Sweep => {
            let flipped = engine.sweep_expired_merges().await?;
            println!("{flipped} merges made permanent");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let cli = Cli::parse();
    let settings = settings::Settings::new(cli.config.as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "supplier_merge={level},engine={level}",
            level = settings.app.level
        ))
        .with_writer(std::io::stderr)
        .init();

    let database_url = cli
        .database_url
        .clone()
        .unwrap_or_else(|| settings.database.url());
    tracing::debug!("connecting to {database_url}");
    let db = connect_db(&database_url).await?;

    let undo_window = settings.merge.undo_window()?;
    let engine = Engine::builder()
        .database(db)
        .undo_window(undo_window)
        .max_retries(settings.merge.max_retries)
        .lock_wait(Duration::from_millis(settings.merge.lock_wait_ms))
        .build()
        .await?;

    run(&engine, cli.command, cli.json).await
}
