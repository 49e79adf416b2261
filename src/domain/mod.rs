//! Domain Layer - Core types for the profile rotator
//!
//! This module contains pure domain types and logic. All network access
//! happens through the ports layer.
//!
//! - `profile`: accounts from the profile source
//! - `wallet`: seed phrase to keypair derivation
//! - `ledger`: append-only record of finished profiles
//! - `checkpoint`: crash recovery for the rotation loop
//! - `retry`: attempt budgets and backoff
//! - `amount`: decimal and token base unit conversion

pub mod profile;
pub mod wallet;
pub mod ledger;
pub mod checkpoint;
pub mod retry;
pub mod amount;

pub use profile::Profile;
pub use wallet::{DerivationError, SeedPhrase, Wallet, DEFAULT_DERIVATION_PATH};
pub use ledger::{Ledger, LedgerError};
pub use checkpoint::{ActiveProfile, CheckpointStore, CycleCheckpoint, PersistError};
pub use retry::RetryPolicy;
pub use amount::AmountError;
