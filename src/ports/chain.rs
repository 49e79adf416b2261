use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use thiserror::Error;

use crate::domain::Wallet;

/// Blockchain client error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChainError {
    #[error("RPC request failed: {0}")]
    RpcError(String),

    #[error("Transaction signing failed: {0}")]
    SigningError(String),

    #[error("Transaction {tx_hash:?} reverted")]
    Reverted { tx_hash: TxHash },

    #[error("Timeout after {seconds}s waiting for receipt of {tx_hash:?}")]
    ConfirmationTimeout { tx_hash: TxHash, seconds: u64 },

    #[error("Transaction {tx_hash:?} dropped from mempool")]
    Dropped { tx_hash: TxHash },

    #[error("Insufficient balance for transfer: have {have}, need {need}")]
    InsufficientBalance { have: U256, need: U256 },
}

impl ChainError {
    /// Errors raised after a transaction was submitted
    pub fn is_transaction_failure(&self) -> bool {
        matches!(
            self,
            ChainError::Reverted { .. }
                | ChainError::ConfirmationTimeout { .. }
                | ChainError::Dropped { .. }
        )
    }
}

/// Balance queries and confirmed value transfers.
///
/// Transfers fetch the sender's current nonce, build and sign the
/// transaction with the adapter's fixed fee settings, submit it and wait for
/// a successful receipt. They are one-shot: callers must not retry them.
#[async_trait]
pub trait ChainPort: Send + Sync {
    /// Stablecoin balance in token base units
    async fn stable_balance(&self, owner: Address) -> Result<U256, ChainError>;

    /// Native gas balance in wei
    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError>;

    async fn transfer_stable(
        &self,
        from: &Wallet,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError>;

    async fn transfer_native(
        &self,
        from: &Wallet,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError>;

    /// Worst-case fee of a native transfer (gas limit * max fee), reserved
    /// out of the amount sent
    fn native_transfer_cost(&self) -> U256;

    /// Decimals of the stablecoin token
    fn stable_decimals(&self) -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_failure_classification() {
        let hash = TxHash::zero();
        assert!(ChainError::Reverted { tx_hash: hash }.is_transaction_failure());
        assert!(ChainError::ConfirmationTimeout {
            tx_hash: hash,
            seconds: 300
        }
        .is_transaction_failure());
        assert!(ChainError::Dropped { tx_hash: hash }.is_transaction_failure());

        assert!(!ChainError::RpcError("x".into()).is_transaction_failure());
        assert!(!ChainError::SigningError("x".into()).is_transaction_failure());
    }

    #[test]
    fn test_error_display() {
        let err = ChainError::ConfirmationTimeout { tx_hash: TxHash::zero(), seconds: 300 };
        assert!(err.to_string().contains("300s"));
    }
}
