//! Run-aborting errors.
//!
//! Anything in this module stops the whole run. Retryable exchange failures
//! never reach here: they stay inside the cycle engine.

use rust_decimal::Decimal;
use thiserror::Error;

/// Where in the per-profile sequence a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ResolveWallet,
    RestoreCarry,
    MigrateStable,
    MigrateNative,
    BindSession,
    PositionCycles,
    BalanceAudit,
    Checkpoint,
    CommitLedger,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Step::ResolveWallet => "wallet resolution",
            Step::RestoreCarry => "carry-state restore",
            Step::MigrateStable => "stablecoin migration",
            Step::MigrateNative => "gas migration",
            Step::BindSession => "exchange session bind",
            Step::PositionCycles => "position cycles",
            Step::BalanceAudit => "post-cycle balance audit",
            Step::Checkpoint => "checkpoint write",
            Step::CommitLedger => "ledger commit",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Asset {
    Stablecoin,
    NativeGas,
}

impl std::fmt::Display for Asset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Asset::Stablecoin => f.write_str("stablecoin"),
            Asset::NativeGas => f.write_str("native gas"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FatalError {
    #[error("credential not found: {0}")]
    CredentialNotFound(String),

    #[error("wallet derivation failed: {0}")]
    DerivationError(String),

    #[error("insufficient {asset} in {owner}: have {have}, need {need}")]
    InsufficientFunds {
        asset: Asset,
        owner: String,
        have: Decimal,
        need: Decimal,
    },

    #[error("transaction failed: {0}")]
    TransactionFailed(String),

    #[error("chain query failed: {0}")]
    ChainUnavailable(String),

    #[error("exchange session error: {0}")]
    Session(String),

    #[error("stray position could not be closed: {0}")]
    PositionCloseFailed(String),

    #[error("iteration {iteration} failed {attempts} times in a row")]
    IterationExhausted { iteration: u32, attempts: u32 },

    #[error(
        "checkpoint holds unfinished profile {in_flight} but the next pending profile is {}",
        .next.as_deref().unwrap_or("none")
    )]
    UnfinishedProfile {
        in_flight: String,
        next: Option<String>,
    },

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("checkpoint error: {0}")]
    Persistence(String),
}

impl FatalError {
    pub fn at(self, profile_id: &str, step: Step) -> RunError {
        RunError {
            profile_id: profile_id.to_string(),
            step,
            kind: self,
        }
    }
}

/// Fatal failure with the profile and step it happened in
#[derive(Debug, Error)]
#[error("profile {profile_id} failed during {step}: {kind}")]
pub struct RunError {
    pub profile_id: String,
    pub step: Step,
    #[source]
    pub kind: FatalError,
}
