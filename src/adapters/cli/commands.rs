//! CLI Command Handlers
//!
//! Implementation of all CLI commands for the profile rotator.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::adapters::adspower::AdsPowerClient;
use crate::adapters::evm::{EvmClient, EvmConfig};
use crate::adapters::exchange::{ExchangeClient, ExchangeConfig};
use crate::adapters::keys::SeedFolder;
use crate::application::{CycleOrchestrator, CycleSettings, WalletResolver};
use crate::config::{load_config, Config};
use crate::domain::amount::{to_decimal, NATIVE_DECIMALS};
use crate::domain::{CheckpointStore, Ledger};
use crate::ports::{ChainPort, ProfileSource};

const DEFAULT_CONFIG: &str = "config/polygon.toml";

/// Rotator - fund migration and position cycles across browser profiles
#[derive(Parser, Debug)]
#[command(
    name = "rotator",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Fund migration and fixed position cycles across browser profiles",
    long_about = "Rotator walks the AdsPower profile list, moves stablecoin and gas from the \
                  previous profile's wallet to the next one, then runs a fixed number of \
                  open/close cycles on the exchange before moving on."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Process every pending profile
    Run(RunCmd),

    /// Show ledger and checkpoint state
    Status(StatusCmd),

    /// List profiles with their processed state
    Profiles(ProfilesCmd),

    /// Show the wallet derived for a profile
    Wallet(WalletCmd),
}

impl Command {
    pub fn config_path(&self) -> &Path {
        match self {
            Command::Run(cmd) => &cmd.config,
            Command::Status(cmd) => &cmd.config,
            Command::Profiles(cmd) => &cmd.config,
            Command::Wallet(cmd) => &cmd.config,
        }
    }
}

/// Process every pending profile
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,
}

/// Show ledger and checkpoint state
#[derive(Parser, Debug)]
pub struct StatusCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Output format (text, json)
    #[arg(short, long, value_name = "FORMAT", default_value = "text")]
    pub format: String,
}

/// List profiles
#[derive(Parser, Debug)]
pub struct ProfilesCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,
}

/// Show a profile wallet
#[derive(Parser, Debug)]
pub struct WalletCmd {
    /// Profile id (seed file name without .txt)
    #[arg(value_name = "PROFILE_ID")]
    pub profile_id: String,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Also query on-chain balances
    #[arg(short, long)]
    pub balances: bool,
}

/// Execute the CLI command
pub async fn execute(app: CliApp) -> Result<()> {
    let config_path = app.command.config_path().to_path_buf();
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    init_logging(app.verbose, app.debug, &config.logging.level)?;

    match app.command {
        Command::Run(_) => run_command(&config).await,
        Command::Status(cmd) => status_command(&config, &cmd),
        Command::Profiles(_) => profiles_command(&config).await,
        Command::Wallet(cmd) => wallet_command(&config, &cmd).await,
    }
}

/// Initialize logging system
fn init_logging(verbose: bool, debug: bool, config_level: &str) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config_level))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

fn request_timeout(config: &Config) -> Duration {
    Duration::from_secs(config.trading.request_timeout_seconds)
}

fn chain_client(config: &Config) -> Result<EvmClient> {
    let evm_config = EvmConfig::try_from(&config.chain).context("Invalid chain configuration")?;
    EvmClient::new(evm_config).context("Failed to create RPC client")
}

async fn fetch_profiles(config: &Config) -> Result<Vec<crate::domain::Profile>> {
    let source = AdsPowerClient::new(&config.profiles.api_url, request_timeout(config))
        .context("Failed to create profile API client")?;
    source
        .list_profiles(config.profiles.page_size)
        .await
        .context("Failed to list profiles")
}

/// Handle run command
async fn run_command(config: &Config) -> Result<()> {
    tracing::info!("Starting profile rotation");

    let chain = chain_client(config)?;
    let exchange = ExchangeClient::new(ExchangeConfig::new(
        config.trading.exchange_url.clone(),
        request_timeout(config),
    ))
    .context("Failed to create exchange client")?;
    let resolver = WalletResolver::new(SeedFolder::new(config.profiles.folder_keys_path()));
    let ledger = Ledger::load(config.ledger.processed_ids_path()).context("Failed to load ledger")?;

    let profiles = fetch_profiles(config).await?;

    let mut orchestrator =
        CycleOrchestrator::new(chain, exchange, resolver, ledger, CycleSettings::from(config));
    if let Some(path) = config.ledger.checkpoint_path() {
        orchestrator = orchestrator
            .with_checkpoint(CheckpointStore::new(path))
            .context("Failed to load cycle checkpoint")?;
    }

    let summary = orchestrator.run(&profiles).await?;

    println!("Processed: {}", summary.processed);
    println!("Skipped:   {}", summary.skipped);
    Ok(())
}

/// Handle status command
fn status_command(config: &Config, cmd: &StatusCmd) -> Result<()> {
    let ledger = Ledger::load(config.ledger.processed_ids_path()).context("Failed to load ledger")?;
    let checkpoint = match config.ledger.checkpoint_path() {
        Some(path) => Some(
            CheckpointStore::new(path)
                .load()
                .context("Failed to load cycle checkpoint")?,
        ),
        None => None,
    };

    match cmd.format.as_str() {
        "json" => {
            let body = serde_json::json!({
                "ledger": ledger.path().display().to_string(),
                "processed": ledger.len(),
                "checkpoint": checkpoint,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        _ => {
            println!("Ledger:     {}", ledger.path().display());
            println!("Processed:  {}", ledger.len());
            match checkpoint {
                Some(cp) => {
                    println!(
                        "Previous:   {}",
                        cp.previous_profile_id.as_deref().unwrap_or("-")
                    );
                    println!("Migrate:    {}", cp.should_migrate);
                    match cp.active {
                        Some(active) => println!(
                            "In flight:  {} (stable moved: {}, gas moved: {}, iterations: {}/{})",
                            active.profile_id,
                            active.stable_migrated,
                            active.native_migrated,
                            active.completed_iterations,
                            config.trading.max_iterations
                        ),
                        None => println!("In flight:  -"),
                    }
                }
                None => println!("Checkpoint: disabled"),
            }
        }
    }

    Ok(())
}

/// Handle profiles command
async fn profiles_command(config: &Config) -> Result<()> {
    let ledger = Ledger::load(config.ledger.processed_ids_path()).context("Failed to load ledger")?;
    let profiles = fetch_profiles(config).await?;

    let mut pending = 0;
    for profile in &profiles {
        let done = ledger.is_processed(&profile.id);
        if !done {
            pending += 1;
        }
        println!("[{}] {}", if done { "x" } else { " " }, profile);
    }
    println!();
    println!("{} profiles, {} pending", profiles.len(), pending);

    Ok(())
}

/// Handle wallet command
async fn wallet_command(config: &Config, cmd: &WalletCmd) -> Result<()> {
    let resolver = WalletResolver::new(SeedFolder::new(config.profiles.folder_keys_path()));
    let wallet = resolver.resolve(&cmd.profile_id)?;

    println!("Profile: {}", cmd.profile_id);
    println!("Address: {:?}", wallet.address());

    if cmd.balances {
        let chain = chain_client(config)?;
        let stable = chain
            .stable_balance(wallet.address())
            .await
            .context("Failed to get stablecoin balance")?;
        let native = chain
            .native_balance(wallet.address())
            .await
            .context("Failed to get native balance")?;

        println!("Stable:  {}", to_decimal(stable, chain.stable_decimals()));
        println!("Native:  {}", to_decimal(native, NATIVE_DECIMALS));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_app_parse_run() {
        let args = vec!["rotator", "run", "--config", "test.toml"];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Run(cmd) => assert_eq!(cmd.config, PathBuf::from("test.toml")),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_default_config_path() {
        let app = CliApp::try_parse_from(vec!["rotator", "run"]).unwrap();
        assert_eq!(app.command.config_path(), Path::new("config/polygon.toml"));
    }

    #[test]
    fn test_cli_app_parse_status() {
        let args = vec!["rotator", "status", "--format", "json"];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Status(cmd) => assert_eq!(cmd.format, "json"),
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_cli_app_parse_wallet() {
        let args = vec!["rotator", "wallet", "jb0x1a", "--balances"];
        let app = CliApp::try_parse_from(args).unwrap();

        match app.command {
            Command::Wallet(cmd) => {
                assert_eq!(cmd.profile_id, "jb0x1a");
                assert!(cmd.balances);
            }
            _ => panic!("Expected Wallet command"),
        }
    }

    #[test]
    fn test_wallet_requires_profile_id() {
        assert!(CliApp::try_parse_from(vec!["rotator", "wallet"]).is_err());
    }

    #[test]
    fn test_cli_app_parse_profiles() {
        let args = vec!["rotator", "profiles", "-c", "other.toml"];
        let app = CliApp::try_parse_from(args).unwrap();

        assert!(matches!(app.command, Command::Profiles(_)));
        assert_eq!(app.command.config_path(), Path::new("other.toml"));
    }

    #[test]
    fn test_global_flags() {
        let args = vec!["rotator", "-v", "--debug", "status"];
        let app = CliApp::try_parse_from(args).unwrap();

        assert!(app.verbose);
        assert!(app.debug);
    }
}
