use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use wallet_ledger::dlq::LogDLQ;
use wallet_ledger::ingestion::CsvReader;
use wallet_ledger::processor::Processor;
use wallet_ledger::{InMemoryStore, SystemClock, Wallet, WalletConfig};

/// Replays a wallet journal and prints the resulting balances.
#[derive(Parser)]
#[command(name = "wallet_ledger", version)]
struct Cli {
    /// CSV journal with columns: type, account, reference, amount, note
    journal: PathBuf,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main] // using Tokio runtime for async
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => WalletConfig::load(path)?,
        None => WalletConfig::default(),
    };

    let file = File::open(&cli.journal)?;
    let ingestion = CsvReader::new(file);

    // Initialize the wallet with injected components
    let wallet = Arc::new(
        Wallet::new(InMemoryStore::new(), SystemClock)
            .with_history_limit(config.history.default_limit),
    );
    let mut processor = Processor::new(ingestion, wallet, LogDLQ::default());

    processor.process().await?;

    processor.flush(std::io::stdout().lock())?;

    Ok(())
}
