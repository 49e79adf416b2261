//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config/polygon.toml.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::application::{CycleSettings, MigrationPolicy};
use crate::domain::RetryPolicy;
use crate::ports::{OpenOrder, TradeSide};

/// Main configuration structure matching polygon.toml
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub chain: ChainSection,
    pub profiles: ProfilesSection,
    pub ledger: LedgerSection,
    pub trading: TradingSection,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// EVM chain configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct ChainSection {
    /// JSON-RPC endpoint (RPC_URL env var overrides)
    pub http_provider: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    /// ERC-20 stablecoin contract address
    pub stable_token: String,
    #[serde(default = "default_stable_decimals")]
    pub stable_decimals: u32,
    /// EIP-1559 max fee per gas, gwei
    #[serde(default = "default_fee_gwei")]
    pub max_fee_gwei: u64,
    #[serde(default = "default_fee_gwei")]
    pub priority_fee_gwei: u64,
    #[serde(default = "default_token_transfer_gas")]
    pub token_transfer_gas: u64,
    #[serde(default = "default_native_transfer_gas")]
    pub native_transfer_gas: u64,
    /// Receipt wait per transaction
    #[serde(default = "default_tx_timeout_seconds")]
    pub tx_timeout_seconds: u64,
    /// Native balance floor, whole coins
    #[serde(default = "default_min_native_balance")]
    pub min_native_balance: Decimal,
    /// Pause between migration transfers and around profile boundaries
    #[serde(default = "default_settle_delay_seconds")]
    pub settle_delay_seconds: u64,
}

impl ChainSection {
    /// Get RPC URL with environment variable override
    /// Checks RPC_URL env var first, falls back to config value
    pub fn get_http_provider(&self) -> String {
        std::env::var("RPC_URL").unwrap_or_else(|_| self.http_provider.clone())
    }
}

/// Profile source and key folder
#[derive(Debug, Clone, Deserialize)]
pub struct ProfilesSection {
    /// AdsPower local API base, e.g. http://local.adspower.net:50325
    pub api_url: String,
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Directory holding `{profile_id}.txt` seed files
    pub folder_keys: String,
}

impl ProfilesSection {
    pub fn folder_keys_path(&self) -> PathBuf {
        expand(&self.folder_keys)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSection {
    /// Processed-profile ledger, one id per line
    pub processed_ids_path: String,
    /// Resumable cycle checkpoint (disabled when absent)
    #[serde(default)]
    pub checkpoint_path: Option<String>,
}

impl LedgerSection {
    pub fn processed_ids_path(&self) -> PathBuf {
        expand(&self.processed_ids_path)
    }

    pub fn checkpoint_path(&self) -> Option<PathBuf> {
        self.checkpoint_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(expand)
    }
}

/// Exchange and position parameters
#[derive(Debug, Clone, Deserialize)]
pub struct TradingSection {
    pub exchange_url: String,
    pub market: String,
    #[serde(default = "default_side")]
    pub side: TradeSide,
    #[serde(default = "default_size")]
    pub size: Decimal,
    #[serde(default = "default_leverage")]
    pub leverage: Decimal,
    /// Fractional slippage (0.01 = 1%)
    #[serde(default = "default_slippage")]
    pub slippage: Decimal,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Stablecoin floor as a multiple of `size`
    #[serde(default = "default_stable_margin")]
    pub stable_margin: Decimal,
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl TradingSection {
    /// Minimum stablecoin balance: size * stable_margin
    pub fn min_stable(&self) -> Decimal {
        self.size * self.stable_margin
    }

    pub fn order(&self) -> OpenOrder {
        OpenOrder {
            market: self.market.clone(),
            side: self.side,
            size: self.size,
            leverage: self.leverage,
            slippage: self.slippage,
        }
    }
}

/// Retry budgets and backoff
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_backoff_seconds")]
    pub backoff_seconds: u64,
    /// Consecutive failures allowed per iteration (0 = unbounded)
    #[serde(default = "default_max_iteration_retries")]
    pub max_iteration_retries: u32,
    #[serde(default = "default_iteration_backoff_base_ms")]
    pub iteration_backoff_base_ms: u64,
    #[serde(default = "default_iteration_backoff_max_seconds")]
    pub iteration_backoff_max_seconds: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff_seconds: default_backoff_seconds(),
            max_iteration_retries: default_max_iteration_retries(),
            iteration_backoff_base_ms: default_iteration_backoff_base_ms(),
            iteration_backoff_max_seconds: default_iteration_backoff_max_seconds(),
        }
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_chain_id() -> u64 {
    137
}

fn default_stable_decimals() -> u32 {
    6
}

fn default_fee_gwei() -> u64 {
    35
}

fn default_token_transfer_gas() -> u64 {
    100_000
}

fn default_native_transfer_gas() -> u64 {
    50_000
}

fn default_tx_timeout_seconds() -> u64 {
    300
}

fn default_min_native_balance() -> Decimal {
    dec!(0.5)
}

fn default_settle_delay_seconds() -> u64 {
    10
}

fn default_page_size() -> u32 {
    100
}

fn default_side() -> TradeSide {
    TradeSide::Buy
}

fn default_size() -> Decimal {
    dec!(50)
}

fn default_leverage() -> Decimal {
    dec!(1)
}

fn default_slippage() -> Decimal {
    dec!(0.01)
}

fn default_max_iterations() -> u32 {
    10
}

fn default_stable_margin() -> Decimal {
    dec!(1.1)
}

fn default_request_timeout_seconds() -> u64 {
    30
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_seconds() -> u64 {
    5
}

fn default_max_iteration_retries() -> u32 {
    20
}

fn default_iteration_backoff_base_ms() -> u64 {
    1000
}

fn default_iteration_backoff_max_seconds() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Chain
        require_non_empty("http_provider", &self.chain.http_provider)?;
        require_non_empty("stable_token", &self.chain.stable_token)?;

        if self.chain.stable_token.parse::<ethers::types::Address>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "stable_token is not an address: {}",
                self.chain.stable_token
            )));
        }

        if self.chain.tx_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "tx_timeout_seconds must be > 0".to_string(),
            ));
        }

        if self.chain.min_native_balance < Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "min_native_balance must be >= 0, got {}",
                self.chain.min_native_balance
            )));
        }

        // Profiles
        require_non_empty("api_url", &self.profiles.api_url)?;
        require_non_empty("folder_keys", &self.profiles.folder_keys)?;

        if self.profiles.page_size == 0 {
            return Err(ConfigError::ValidationError(
                "page_size must be > 0".to_string(),
            ));
        }

        // Ledger
        require_non_empty("processed_ids_path", &self.ledger.processed_ids_path)?;

        // Trading
        require_non_empty("exchange_url", &self.trading.exchange_url)?;
        require_non_empty("market", &self.trading.market)?;

        if self.trading.size <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "size must be > 0, got {}",
                self.trading.size
            )));
        }

        if self.trading.leverage <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "leverage must be > 0, got {}",
                self.trading.leverage
            )));
        }

        if self.trading.slippage <= Decimal::ZERO || self.trading.slippage >= Decimal::ONE {
            return Err(ConfigError::ValidationError(format!(
                "slippage must be between 0 and 1 (exclusive), got {}",
                self.trading.slippage
            )));
        }

        if self.trading.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "max_iterations must be > 0".to_string(),
            ));
        }

        if self.trading.stable_margin < Decimal::ONE {
            return Err(ConfigError::ValidationError(format!(
                "stable_margin must be >= 1, got {}",
                self.trading.stable_margin
            )));
        }

        // Retry
        if self.retry.attempts == 0 {
            return Err(ConfigError::ValidationError(
                "attempts must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn require_non_empty(name: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::ValidationError(format!("{} cannot be empty", name)));
    }
    Ok(())
}

impl From<&RetrySection> for RetryPolicy {
    fn from(section: &RetrySection) -> Self {
        RetryPolicy {
            attempts: section.attempts,
            backoff: Duration::from_secs(section.backoff_seconds),
            max_iteration_retries: section.max_iteration_retries,
            iteration_backoff_base: Duration::from_millis(section.iteration_backoff_base_ms),
            iteration_backoff_max: Duration::from_secs(section.iteration_backoff_max_seconds),
        }
    }
}

// Conversion from Config to the orchestrator settings
impl From<&Config> for CycleSettings {
    fn from(config: &Config) -> Self {
        CycleSettings {
            order: config.trading.order(),
            max_iterations: config.trading.max_iterations,
            retry: RetryPolicy::from(&config.retry),
            migration: MigrationPolicy {
                min_stable: config.trading.min_stable(),
                min_native: config.chain.min_native_balance,
                settle_delay: Duration::from_secs(config.chain.settle_delay_seconds),
            },
        }
    }
}
