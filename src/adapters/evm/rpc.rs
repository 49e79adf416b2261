//! EVM JSON-RPC client
//!
//! Balance queries and confirmed transfers on an EIP-1559 chain (Polygon by
//! default). Fees are fixed from configuration rather than estimated.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::contract::abigen;
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;

use crate::config::ChainSection;
use crate::domain::Wallet;
use crate::ports::{ChainError, ChainPort};

const GWEI: u64 = 1_000_000_000;

abigen!(
    Erc20,
    r#"[
        function balanceOf(address account) external view returns (uint256)
        function transfer(address to, uint256 amount) external returns (bool)
    ]"#
);

/// Fixed fee configuration applied to every transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSettings {
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub token_transfer_gas: U256,
    pub native_transfer_gas: U256,
}

impl GasSettings {
    pub fn from_gwei(max_fee: u64, priority_fee: u64, token_gas: u64, native_gas: u64) -> Self {
        Self {
            max_fee_per_gas: U256::from(max_fee) * U256::from(GWEI),
            max_priority_fee_per_gas: U256::from(priority_fee) * U256::from(GWEI),
            token_transfer_gas: U256::from(token_gas),
            native_transfer_gas: U256::from(native_gas),
        }
    }

    /// gas limit * max fee of a native transfer
    pub fn native_transfer_cost(&self) -> U256 {
        self.native_transfer_gas * self.max_fee_per_gas
    }
}

#[derive(Debug, Clone)]
pub struct EvmConfig {
    pub rpc_url: String,
    pub chain_id: u64,
    pub stable_token: Address,
    pub stable_decimals: u32,
    pub gas: GasSettings,
    pub tx_timeout: Duration,
}

impl TryFrom<&ChainSection> for EvmConfig {
    type Error = ChainError;

    fn try_from(section: &ChainSection) -> Result<Self, Self::Error> {
        let stable_token = section
            .stable_token
            .parse::<Address>()
            .map_err(|e| ChainError::RpcError(format!("Invalid token address: {}", e)))?;

        Ok(Self {
            rpc_url: section.get_http_provider(),
            chain_id: section.chain_id,
            stable_token,
            stable_decimals: section.stable_decimals,
            gas: GasSettings::from_gwei(
                section.max_fee_gwei,
                section.priority_fee_gwei,
                section.token_transfer_gas,
                section.native_transfer_gas,
            ),
            tx_timeout: Duration::from_secs(section.tx_timeout_seconds),
        })
    }
}

/// Wrapper around an ethers HTTP provider
#[derive(Clone)]
pub struct EvmClient {
    provider: Provider<Http>,
    token: Erc20<Provider<Http>>,
    config: EvmConfig,
}

impl EvmClient {
    /// Create a new client. No request is made until the first call.
    pub fn new(config: EvmConfig) -> Result<Self, ChainError> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| ChainError::RpcError(e.to_string()))?
            .interval(Duration::from_secs(2));
        let token = Erc20::new(config.stable_token, Arc::new(provider.clone()));

        Ok(Self {
            provider,
            token,
            config,
        })
    }

    pub fn config(&self) -> &EvmConfig {
        &self.config
    }

    /// Latest nonce of `owner`
    async fn nonce(&self, owner: Address) -> Result<U256, ChainError> {
        self.provider
            .get_transaction_count(owner, None)
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))
    }

    /// Sign, submit and wait for a successful receipt
    async fn submit(
        &self,
        from: &Wallet,
        tx: Eip1559TransactionRequest,
    ) -> Result<TxHash, ChainError> {
        let client = SignerMiddleware::new(
            self.provider.clone(),
            from.signer_for_chain(self.config.chain_id),
        );

        let pending = client
            .send_transaction(TypedTransaction::Eip1559(tx), None)
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;

        let tx_hash = pending.tx_hash();
        tracing::info!("Submitted {:?}, waiting for receipt", tx_hash);

        let receipt = tokio::time::timeout(self.config.tx_timeout, pending)
            .await
            .map_err(|_| ChainError::ConfirmationTimeout {
                tx_hash,
                seconds: self.config.tx_timeout.as_secs(),
            })?
            .map_err(|e| ChainError::RpcError(e.to_string()))?
            .ok_or(ChainError::Dropped { tx_hash })?;

        if receipt.status == Some(U64::from(1)) {
            tracing::debug!("Receipt for {:?} in block {:?}", tx_hash, receipt.block_number);
            Ok(tx_hash)
        } else {
            Err(ChainError::Reverted { tx_hash })
        }
    }
}

/// EIP-1559 request with the fixed fee settings
#[allow(clippy::too_many_arguments)]
pub fn build_request(
    from: Address,
    to: Address,
    value: U256,
    data: Option<Bytes>,
    gas: U256,
    nonce: U256,
    chain_id: u64,
    fees: &GasSettings,
) -> Eip1559TransactionRequest {
    let tx = Eip1559TransactionRequest::new()
        .from(from)
        .to(to)
        .value(value)
        .gas(gas)
        .max_fee_per_gas(fees.max_fee_per_gas)
        .max_priority_fee_per_gas(fees.max_priority_fee_per_gas)
        .nonce(nonce)
        .chain_id(chain_id);

    match data {
        Some(data) => tx.data(data),
        None => tx,
    }
}

#[async_trait]
impl ChainPort for EvmClient {
    async fn stable_balance(&self, owner: Address) -> Result<U256, ChainError> {
        self.token
            .balance_of(owner)
            .call()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError> {
        self.provider
            .get_balance(owner, None)
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))
    }

    async fn transfer_stable(
        &self,
        from: &Wallet,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        let calldata = self
            .token
            .transfer(to, amount)
            .calldata()
            .ok_or_else(|| ChainError::SigningError("Failed to encode transfer".to_string()))?;

        let nonce = self.nonce(from.address()).await?;
        let tx = build_request(
            from.address(),
            self.config.stable_token,
            U256::zero(),
            Some(calldata),
            self.config.gas.token_transfer_gas,
            nonce,
            self.config.chain_id,
            &self.config.gas,
        );

        tracing::info!(
            "Sending {} token units {:?} -> {:?} (nonce {})",
            amount,
            from.address(),
            to,
            nonce
        );
        self.submit(from, tx).await
    }

    async fn transfer_native(
        &self,
        from: &Wallet,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        let nonce = self.nonce(from.address()).await?;
        let tx = build_request(
            from.address(),
            to,
            amount,
            None,
            self.config.gas.native_transfer_gas,
            nonce,
            self.config.chain_id,
            &self.config.gas,
        );

        tracing::info!("Sending {} wei {:?} -> {:?} (nonce {})", amount, from.address(), to, nonce);
        self.submit(from, tx).await
    }

    fn native_transfer_cost(&self) -> U256 {
        self.config.gas.native_transfer_cost()
    }

    fn stable_decimals(&self) -> u32 {
        self.config.stable_decimals
    }
}
