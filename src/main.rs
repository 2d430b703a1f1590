//! Tip Bot CLI
//!
//! Runs the bot loop or inspects its local state.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tipbot::common::init_from_config;
use tipbot::ledger::AlgodClient;
use tipbot::storage::PendingStore;
use tipbot::types::format_amount;
use tipbot::wallet::{Balances, Wallet};
use tipbot::{AccountDirectory, SqliteStore, TipBotConfig, TipBotService};

#[derive(Parser)]
#[command(name = "tipbot")]
#[command(about = "Custodial tipping bot for Reddit on Algorand")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot loop
    Run,

    /// Resolve a user (creating the wallet if needed) and print its balances
    Account {
        /// Platform username
        username: String,
    },

    /// List pending operations persisted in the database
    Pending,

    /// Generate a fresh key pair
    Keygen,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Commands::Keygen = cli.command {
        let wallet = Wallet::generate();
        println!("address:     {}", wallet.address());
        println!("private key: {}", wallet.private_key());
        return Ok(());
    }

    let config = TipBotConfig::from_env()?;
    init_from_config(&config)?;
    config.log_summary();

    match cli.command {
        Commands::Run => run_bot(&config).await?,
        Commands::Account { username } => show_account(&config, &username).await?,
        Commands::Pending => list_pending(&config).await?,
        Commands::Keygen => {}
    }

    Ok(())
}

/// Run until interrupted
async fn run_bot(config: &TipBotConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut service = TipBotService::from_config(config)?;

    tokio::select! {
        result = service.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(target: "tipbot::service", "interrupted, shutting down");
        }
    }

    Ok(())
}

async fn show_account(
    config: &TipBotConfig,
    username: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(SqliteStore::new(&config.db_path)?);
    let directory = AccountDirectory::new(store);
    let resolved = directory.resolve(username).await?;

    let ledger = AlgodClient::from_config(&config.ledger);
    let balances = Balances::fetch(
        &ledger,
        resolved.account.address(),
        config.ledger.asset_id,
    )
    .await?;

    println!("user:     {} (id {})", resolved.account.identity, resolved.account.id);
    if resolved.is_new {
        println!("          wallet created just now");
    }
    println!("address:  {}", resolved.account.address());
    println!("native:   {}", format_amount(balances.native));
    println!("{:<9} {}", format!("{}:", config.ledger.asset_name), balances.asset);
    Ok(())
}

async fn list_pending(config: &TipBotConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::new(&config.db_path)?;
    let pending = store.load_pending().await?;

    if pending.is_empty() {
        println!("no pending operations");
        return Ok(());
    }

    for op in pending {
        println!(
            "{}  {:<15} {:<20} {}  (valid until round {})",
            op.submitted_at.format("%Y-%m-%d %H:%M:%S"),
            op.kind.to_string(),
            op.sender,
            op.tx_id,
            op.last_valid
        );
    }
    Ok(())
}
