//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - EVM: JSON-RPC balances and confirmed transfers (ethers)
//! - Exchange: perpetuals REST client with wallet-signed commands
//! - AdsPower: local API profile listing
//! - Keys: per-profile seed files
//! - CLI: Command-line interface handlers

pub mod evm;
pub mod exchange;
pub mod adspower;
pub mod keys;
pub mod cli;

pub use evm::EvmClient;
pub use exchange::ExchangeClient;
pub use adspower::AdsPowerClient;
pub use keys::SeedFolder;
pub use cli::CliApp;
