//! Rotator - profile rotation with fund migration and position cycles
//!
//! Walks a list of browser profiles, moves stablecoin and gas from the
//! previous profile's wallet into the next one, and runs a fixed number of
//! open/close position cycles on a derivatives exchange per profile.
//!
//! # Modules
//!
//! - `domain`: Core types (Profile, Wallet, Ledger, CycleCheckpoint, RetryPolicy)
//! - `ports`: Trait abstractions (ChainPort, ExchangePort, CredentialStore, ProfileSource)
//! - `adapters`: External implementations (EVM RPC, exchange REST, AdsPower, seed files, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Orchestrator, cycle engine and fund migration

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod config;
pub mod application;
