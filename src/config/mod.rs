//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    ChainSection, Config, ConfigError, LedgerSection, LoggingSection, ProfilesSection,
    RetrySection, TradingSection, load_config,
};
