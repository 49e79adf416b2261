//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - The blockchain (balances, confirmed transfers)
//! - The derivatives exchange (presence-only positions)
//! - Per-profile seed storage
//! - The profile list

pub mod chain;
pub mod exchange;
pub mod credentials;
pub mod profiles;
pub mod mocks;

// Re-export main traits and types
pub use chain::{ChainError, ChainPort};
pub use exchange::{ExchangeAck, ExchangeError, ExchangePort, OpenOrder, TradeSide, STATUS_OK};
pub use credentials::{CredentialError, CredentialStore};
pub use profiles::{ProfileSource, ProfileSourceError};
