//! --- Forge Ledger Operator Tool ---
//! Thin command-line glue over the library: configuration bootstrap, key
//! generation, genesis snapshots and offline chain audits.

use clap::{Parser, Subcommand};
use forge_ledger::{
    config::{ConfigError, LedgerConfig},
    consensus::build_policy,
    ledger::{Ledger, LedgerError},
    metrics,
    persistence::{self, PersistenceError},
    wallet::Wallet,
};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Debug, Error)]
enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("Snapshot error: {0}")]
    Persistence(#[from] PersistenceError),
    #[error("Output encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
    #[error("Logging setup failed: {0}")]
    Logging(#[from] tracing::subscriber::SetGlobalDefaultError),
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = "Operator tool for a multi-dimensional, hash-chained knowledge ledger."
)]
struct Cli {
    #[arg(short, long, value_name = "FILE", default_value = "ledger.toml", global = true)]
    config: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default configuration file if none exists.
    InitConfig,
    /// Generate an ed25519 key pair for an authority.
    Keygen,
    /// Write a snapshot holding only the genesis block.
    Genesis {
        #[arg(short, long, value_name = "SNAPSHOT_FILE")]
        out: PathBuf,
    },
    /// Replay a snapshot under the configured policies and validate it.
    Audit {
        #[arg(long, value_name = "SNAPSHOT_FILE")]
        chain: PathBuf,
    },
    /// Print statistics for a snapshot.
    Stats {
        #[arg(long, value_name = "SNAPSHOT_FILE")]
        chain: PathBuf,
        /// Also print Prometheus metrics gathered during the replay.
        #[arg(long)]
        metrics: bool,
    },
}

fn initialize_logging(level: &str) -> Result<(), CliError> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(level))
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let config = LedgerConfig::load(&cli.config.display().to_string())?;
    initialize_logging(&config.logging.level)?;

    match cli.command {
        Commands::InitConfig => {
            info!("Configuration ready at '{}'.", cli.config.display());
        }
        Commands::Keygen => {
            let wallet = Wallet::new();
            println!("public_key_hex  = \"{}\"", wallet.address());
            println!("private_key_hex = \"{}\"", wallet.private_key_hex());
        }
        Commands::Genesis { out } => {
            let mut ledger = Ledger::from_config(&config);
            ledger.create_genesis()?;
            persistence::save_snapshot(&out, &ledger.to_export())?;
            info!("Genesis snapshot written to '{}'.", out.display());
        }
        Commands::Audit { chain } => audit(&config, &chain)?,
        Commands::Stats { chain, metrics } => {
            let ledger = load_ledger(&config, &chain)?;
            println!("{}", serde_json::to_string_pretty(&ledger.stats())?);
            if metrics {
                print!("{}", metrics::render()?);
            }
        }
    }
    Ok(())
}

fn load_ledger(config: &LedgerConfig, chain: &Path) -> Result<Ledger, CliError> {
    let registry = config.authority_registry()?;
    let policy = build_policy(config, registry);
    let export = persistence::load_snapshot(chain)?;
    Ok(Ledger::from_export(
        export,
        &policy,
        config.rewards.clone(),
        config.balances.clone(),
    )?)
}

fn audit(config: &LedgerConfig, chain: &Path) -> Result<(), CliError> {
    let registry = config.authority_registry()?;
    let policy = build_policy(config, registry);
    info!(policies = ?policy.names(), "Auditing '{}'", chain.display());

    let ledger = match load_ledger(config, chain) {
        Ok(ledger) => ledger,
        Err(CliError::Ledger(LedgerError::Validation(e))) => {
            error!(index = e.index, "Chain replay failed: {}", e.fault);
            println!("INVALID first_failing_index={}", e.index);
            return Err(LedgerError::Validation(e).into());
        }
        Err(e) => return Err(e),
    };

    match ledger.validate_full_chain(&policy) {
        Ok(()) => {
            println!("VALID length={} tip={}", ledger.len(), ledger.tip_hash());
            Ok(())
        }
        Err(e) => {
            println!("INVALID first_failing_index={}", e.index);
            Err(LedgerError::Validation(e).into())
        }
    }
}
