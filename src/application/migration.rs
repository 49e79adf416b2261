//! Fund Migration Step
//!
//! Moves the stablecoin balance and the native gas balance from the previous
//! profile's wallet into the new one. Every failure here is fatal: these are
//! one-shot value transfers and a blind retry could move funds twice.

use std::time::Duration;

use ethers::types::{TxHash, U256};
use rust_decimal::Decimal;

use crate::domain::amount::{to_base_units, to_decimal, NATIVE_DECIMALS};
use crate::domain::Wallet;
use crate::ports::{ChainError, ChainPort};

use super::error::{Asset, FatalError, RunError, Step};

/// Balance floors and pacing for a migration
#[derive(Debug, Clone)]
pub struct MigrationPolicy {
    /// Minimum stablecoin in the source wallet (trade size * margin)
    pub min_stable: Decimal,
    /// Minimum native gas in the source wallet
    pub min_native: Decimal,
    /// Pause between the two transfers so the RPC reports the fresh nonce
    pub settle_delay: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationReceipt {
    pub stable_amount: U256,
    pub stable_tx: TxHash,
    pub native_amount: U256,
    pub native_tx: TxHash,
}

pub struct FundMigration<'a, C: ChainPort> {
    chain: &'a C,
    policy: &'a MigrationPolicy,
}

impl<'a, C: ChainPort> FundMigration<'a, C> {
    pub fn new(chain: &'a C, policy: &'a MigrationPolicy) -> Self {
        Self { chain, policy }
    }

    pub async fn migrate(
        &self,
        profile_id: &str,
        from: &Wallet,
        to: &Wallet,
    ) -> Result<MigrationReceipt, RunError> {
        tracing::info!(
            "Migrating funds {:?} -> {:?} for profile {}",
            from.address(),
            to.address(),
            profile_id
        );

        let (stable_amount, stable_tx) = self.send_stable(profile_id, from, to).await?;
        self.settle().await;
        let (native_amount, native_tx) = self.send_native(profile_id, from, to).await?;

        Ok(MigrationReceipt {
            stable_amount,
            stable_tx,
            native_amount,
            native_tx,
        })
    }

    /// Stablecoin leg alone, for callers that record progress per leg
    pub async fn send_stable(
        &self,
        profile_id: &str,
        from: &Wallet,
        to: &Wallet,
    ) -> Result<(U256, TxHash), RunError> {
        self.migrate_stable(from, to)
            .await
            .map_err(|e| e.at(profile_id, Step::MigrateStable))
    }

    /// Gas leg alone
    pub async fn send_native(
        &self,
        profile_id: &str,
        from: &Wallet,
        to: &Wallet,
    ) -> Result<(U256, TxHash), RunError> {
        self.migrate_native(from, to)
            .await
            .map_err(|e| e.at(profile_id, Step::MigrateNative))
    }

    /// Pause so the RPC reports the sender's fresh nonce
    pub async fn settle(&self) {
        if !self.policy.settle_delay.is_zero() {
            tokio::time::sleep(self.policy.settle_delay).await;
        }
    }

    /// Send the entire stablecoin balance
    async fn migrate_stable(
        &self,
        from: &Wallet,
        to: &Wallet,
    ) -> Result<(U256, TxHash), FatalError> {
        let decimals = self.chain.stable_decimals();
        let balance = self
            .chain
            .stable_balance(from.address())
            .await
            .map_err(chain_error)?;

        let floor = to_base_units(self.policy.min_stable, decimals)
            .map_err(|e| FatalError::ChainUnavailable(e.to_string()))?;

        if balance < floor {
            return Err(FatalError::InsufficientFunds {
                asset: Asset::Stablecoin,
                owner: format!("{:?}", from.address()),
                have: to_decimal(balance, decimals),
                need: self.policy.min_stable,
            });
        }

        let tx = self
            .chain
            .transfer_stable(from, to.address(), balance)
            .await
            .map_err(chain_error)?;

        tracing::info!(
            "Stablecoin transfer confirmed: {} ({:?})",
            to_decimal(balance, decimals),
            tx
        );
        Ok((balance, tx))
    }

    /// Send the native balance minus the fee of this very transfer
    async fn migrate_native(
        &self,
        from: &Wallet,
        to: &Wallet,
    ) -> Result<(U256, TxHash), FatalError> {
        let balance = self
            .chain
            .native_balance(from.address())
            .await
            .map_err(chain_error)?;

        let floor = to_base_units(self.policy.min_native, NATIVE_DECIMALS)
            .map_err(|e| FatalError::ChainUnavailable(e.to_string()))?;
        let reserve = self.chain.native_transfer_cost();

        if balance < floor || balance <= reserve {
            return Err(FatalError::InsufficientFunds {
                asset: Asset::NativeGas,
                owner: format!("{:?}", from.address()),
                have: to_decimal(balance, NATIVE_DECIMALS),
                need: self.policy.min_native,
            });
        }

        let amount = balance - reserve;
        let tx = self
            .chain
            .transfer_native(from, to.address(), amount)
            .await
            .map_err(chain_error)?;

        tracing::info!(
            "Gas transfer confirmed: {} ({:?})",
            to_decimal(amount, NATIVE_DECIMALS),
            tx
        );
        Ok((amount, tx))
    }
}

pub(crate) fn chain_error(err: ChainError) -> FatalError {
    if err.is_transaction_failure() {
        tracing::error!("Submitted transaction may still land, check the explorer: {}", err);
    }
    match err {
        ChainError::RpcError(_) => FatalError::ChainUnavailable(err.to_string()),
        _ => FatalError::TransactionFailed(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SeedPhrase;
    use crate::ports::mocks::{ChainCall, MockChain};
    use rust_decimal_macros::dec;

    const SOURCE: &str = "test test test test test test test test test test test junk";
    const TARGET: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn wallets() -> (Wallet, Wallet) {
        (
            Wallet::from_seed_phrase(&SeedPhrase::new(SOURCE)).unwrap(),
            Wallet::from_seed_phrase(&SeedPhrase::new(TARGET)).unwrap(),
        )
    }

    fn policy() -> MigrationPolicy {
        MigrationPolicy {
            min_stable: dec!(55),
            min_native: dec!(0.5),
            settle_delay: Duration::ZERO,
        }
    }

    fn usdc(amount: u64) -> U256 {
        U256::from(amount) * U256::from(1_000_000u64)
    }

    fn matic_milli(milli: u64) -> U256 {
        U256::from(milli) * U256::from(1_000_000_000_000_000u64)
    }

    #[tokio::test]
    async fn test_full_migration() {
        let (from, to) = wallets();
        let chain = MockChain::new()
            .with_native_cost(matic_milli(2))
            .with_stable(from.address(), usdc(60))
            .with_native(from.address(), matic_milli(800));
        let policy = policy();

        let receipt = FundMigration::new(&chain, &policy)
            .migrate("B", &from, &to)
            .await
            .unwrap();

        assert_eq!(receipt.stable_amount, usdc(60));
        assert_eq!(receipt.native_amount, matic_milli(798));
        assert_eq!(chain.stable_of(to.address()), usdc(60));
        assert_eq!(chain.native_of(to.address()), matic_milli(798));
        assert_eq!(chain.native_of(from.address()), U256::zero());
    }

    #[tokio::test]
    async fn test_low_stablecoin_never_transfers() {
        let (from, to) = wallets();
        let chain = MockChain::new()
            .with_stable(from.address(), usdc(54))
            .with_native(from.address(), matic_milli(800));
        let policy = policy();

        let err = FundMigration::new(&chain, &policy)
            .migrate("B", &from, &to)
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::MigrateStable);
        assert!(matches!(
            err.kind,
            FatalError::InsufficientFunds { asset: Asset::Stablecoin, .. }
        ));
        assert!(chain.transfers().is_empty());
    }

    #[tokio::test]
    async fn test_exact_floor_is_enough() {
        let (from, to) = wallets();
        let chain = MockChain::new()
            .with_stable(from.address(), usdc(55))
            .with_native(from.address(), matic_milli(500));
        let policy = policy();

        let receipt = FundMigration::new(&chain, &policy)
            .migrate("B", &from, &to)
            .await
            .unwrap();
        assert_eq!(receipt.stable_amount, usdc(55));
    }

    #[tokio::test]
    async fn test_low_gas_stops_after_stable_transfer() {
        let (from, to) = wallets();
        let chain = MockChain::new()
            .with_stable(from.address(), usdc(60))
            .with_native(from.address(), matic_milli(499));
        let policy = policy();

        let err = FundMigration::new(&chain, &policy)
            .migrate("B", &from, &to)
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::MigrateNative);
        assert!(matches!(
            err.kind,
            FatalError::InsufficientFunds { asset: Asset::NativeGas, .. }
        ));
        let transfers = chain.transfers();
        assert_eq!(transfers.len(), 1);
        assert!(matches!(transfers[0], ChainCall::TransferStable { .. }));
    }

    #[tokio::test]
    async fn test_reverted_transfer_is_fatal() {
        let (from, to) = wallets();
        let chain = MockChain::new()
            .with_stable(from.address(), usdc(60))
            .with_native(from.address(), matic_milli(800))
            .with_transfer_failure(ChainError::Reverted { tx_hash: TxHash::zero() });
        let policy = policy();

        let err = FundMigration::new(&chain, &policy)
            .migrate("B", &from, &to)
            .await
            .unwrap_err();

        assert_eq!(err.step, Step::MigrateStable);
        assert!(matches!(err.kind, FatalError::TransactionFailed(_)));
        // One attempt only, no retry
        assert_eq!(chain.transfers().len(), 1);
    }

    #[tokio::test]
    async fn test_confirmation_timeout_is_transaction_failure() {
        let (from, to) = wallets();
        let chain = MockChain::new()
            .with_stable(from.address(), usdc(60))
            .with_native(from.address(), matic_milli(800))
            .with_transfer_failure(ChainError::ConfirmationTimeout {
                tx_hash: TxHash::zero(),
                seconds: 300,
            });
        let policy = policy();

        let err = FundMigration::new(&chain, &policy)
            .migrate("B", &from, &to)
            .await
            .unwrap_err();
        assert!(matches!(err.kind, FatalError::TransactionFailed(_)));
    }
}
