//! Recording test doubles for every port.
//!
//! Each mock shares its state through `Arc<Mutex<..>>`, so a clone kept by
//! the test observes calls made through the clone handed to the code under
//! test.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ethers::types::{Address, TxHash, U256};
use rust_decimal::Decimal;

use super::chain::{ChainError, ChainPort};
use super::credentials::{CredentialError, CredentialStore};
use super::exchange::{ExchangeAck, ExchangeError, ExchangePort, OpenOrder};
use super::profiles::{ProfileSource, ProfileSourceError};
use crate::domain::{Profile, SeedPhrase, Wallet};

// ============================================================================
// Exchange
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ExchangeCall {
    Bind(Address),
    Positions(String),
    Open(OpenOrder),
    Close { market: String, slippage: Decimal },
}

impl ExchangeCall {
    /// Open and close commands change exchange state
    pub fn is_mutating(&self) -> bool {
        matches!(self, ExchangeCall::Open(_) | ExchangeCall::Close { .. })
    }
}

type Scripted = Arc<Mutex<VecDeque<Result<ExchangeAck, ExchangeError>>>>;

/// In-memory exchange holding at most one position.
///
/// Open/close answers are taken from the scripted queues first and default
/// to success afterwards. A successful ack flips position presence.
#[derive(Debug, Clone, Default)]
pub struct MockExchange {
    calls: Arc<Mutex<Vec<ExchangeCall>>>,
    position_open: Arc<Mutex<bool>>,
    open_responses: Scripted,
    close_responses: Scripted,
    query_failures: Arc<Mutex<VecDeque<ExchangeError>>>,
    bound: Arc<Mutex<Option<Address>>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with a stale position left open
    pub fn with_open_position(self) -> Self {
        *self.position_open.lock().unwrap() = true;
        self
    }

    pub fn with_open_responses(
        self,
        responses: impl IntoIterator<Item = Result<ExchangeAck, ExchangeError>>,
    ) -> Self {
        self.open_responses.lock().unwrap().extend(responses);
        self
    }

    pub fn with_close_responses(
        self,
        responses: impl IntoIterator<Item = Result<ExchangeAck, ExchangeError>>,
    ) -> Self {
        self.close_responses.lock().unwrap().extend(responses);
        self
    }

    /// Fail the next position queries with `error`
    pub fn with_query_failures(self, count: usize, error: ExchangeError) -> Self {
        self.query_failures
            .lock()
            .unwrap()
            .extend(std::iter::repeat(error).take(count));
        self
    }

    pub fn set_position_open(&self, open: bool) {
        *self.position_open.lock().unwrap() = open;
    }

    pub fn has_position(&self) -> bool {
        *self.position_open.lock().unwrap()
    }

    pub fn bound_address(&self) -> Option<Address> {
        *self.bound.lock().unwrap()
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<ExchangeCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    pub fn open_calls(&self) -> usize {
        self.count(|c| matches!(c, ExchangeCall::Open(_)))
    }

    pub fn close_calls(&self) -> usize {
        self.count(|c| matches!(c, ExchangeCall::Close { .. }))
    }

    pub fn mutating_calls(&self) -> usize {
        self.count(ExchangeCall::is_mutating)
    }

    fn count(&self, pred: impl Fn(&ExchangeCall) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| pred(c)).count()
    }

    fn record(&self, call: ExchangeCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn answer(&self, queue: &Scripted, opens: bool) -> Result<ExchangeAck, ExchangeError> {
        let response = queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(ExchangeAck::ok()));

        if matches!(response, Ok(ref ack) if ack.is_success()) {
            self.set_position_open(opens);
        }
        response
    }
}

#[async_trait]
impl ExchangePort for MockExchange {
    async fn bind_wallet(&mut self, wallet: &Wallet) -> Result<(), ExchangeError> {
        self.record(ExchangeCall::Bind(wallet.address()));
        *self.bound.lock().unwrap() = Some(wallet.address());
        Ok(())
    }

    async fn has_open_position(&self, market: &str) -> Result<bool, ExchangeError> {
        self.record(ExchangeCall::Positions(market.to_string()));
        if let Some(error) = self.query_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(self.has_position())
    }

    async fn open_position(&self, order: &OpenOrder) -> Result<ExchangeAck, ExchangeError> {
        self.record(ExchangeCall::Open(order.clone()));
        self.answer(&self.open_responses, true)
    }

    async fn close_position(
        &self,
        market: &str,
        slippage: Decimal,
    ) -> Result<ExchangeAck, ExchangeError> {
        self.record(ExchangeCall::Close {
            market: market.to_string(),
            slippage,
        });
        self.answer(&self.close_responses, false)
    }
}

// ============================================================================
// Chain
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ChainCall {
    StableBalance(Address),
    NativeBalance(Address),
    TransferStable { from: Address, to: Address, amount: U256 },
    TransferNative { from: Address, to: Address, amount: U256 },
}

impl ChainCall {
    pub fn is_transfer(&self) -> bool {
        matches!(self, ChainCall::TransferStable { .. } | ChainCall::TransferNative { .. })
    }
}

/// Ledger of balances keyed by address; transfers move funds between them
#[derive(Debug, Clone)]
pub struct MockChain {
    calls: Arc<Mutex<Vec<ChainCall>>>,
    stable: Arc<Mutex<HashMap<Address, U256>>>,
    native: Arc<Mutex<HashMap<Address, U256>>>,
    transfer_failures: Arc<Mutex<VecDeque<ChainError>>>,
    native_cost: U256,
    stable_decimals: u32,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            calls: Arc::default(),
            stable: Arc::default(),
            native: Arc::default(),
            transfer_failures: Arc::default(),
            // 50_000 gas at 35 gwei
            native_cost: U256::from(1_750_000_000_000_000u64),
            stable_decimals: 6,
        }
    }
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stable(self, owner: Address, amount: U256) -> Self {
        self.stable.lock().unwrap().insert(owner, amount);
        self
    }

    pub fn with_native(self, owner: Address, amount: U256) -> Self {
        self.native.lock().unwrap().insert(owner, amount);
        self
    }

    pub fn with_native_cost(mut self, cost: U256) -> Self {
        self.native_cost = cost;
        self
    }

    /// Fail the next transfer (after submission) with `error`
    pub fn with_transfer_failure(self, error: ChainError) -> Self {
        self.transfer_failures.lock().unwrap().push_back(error);
        self
    }

    pub fn stable_of(&self, owner: Address) -> U256 {
        self.stable.lock().unwrap().get(&owner).copied().unwrap_or_default()
    }

    pub fn native_of(&self, owner: Address) -> U256 {
        self.native.lock().unwrap().get(&owner).copied().unwrap_or_default()
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<ChainCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn transfers(&self) -> Vec<ChainCall> {
        self.get_calls().into_iter().filter(ChainCall::is_transfer).collect()
    }

    fn record(&self, call: ChainCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn move_funds(
        book: &Mutex<HashMap<Address, U256>>,
        from: Address,
        to: Address,
        amount: U256,
        fee: U256,
    ) -> Result<(), ChainError> {
        let mut book = book.lock().unwrap();
        let have = book.get(&from).copied().unwrap_or_default();
        let need = amount.saturating_add(fee);
        if have < need {
            return Err(ChainError::InsufficientBalance { have, need });
        }
        book.insert(from, have - need);
        let credited = book.get(&to).copied().unwrap_or_default().saturating_add(amount);
        book.insert(to, credited);
        Ok(())
    }

    fn next_hash(&self) -> TxHash {
        TxHash::from_low_u64_be(self.calls.lock().unwrap().len() as u64)
    }
}

#[async_trait]
impl ChainPort for MockChain {
    async fn stable_balance(&self, owner: Address) -> Result<U256, ChainError> {
        self.record(ChainCall::StableBalance(owner));
        Ok(self.stable_of(owner))
    }

    async fn native_balance(&self, owner: Address) -> Result<U256, ChainError> {
        self.record(ChainCall::NativeBalance(owner));
        Ok(self.native_of(owner))
    }

    async fn transfer_stable(
        &self,
        from: &Wallet,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.record(ChainCall::TransferStable { from: from.address(), to, amount });
        if let Some(error) = self.transfer_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Self::move_funds(&self.stable, from.address(), to, amount, U256::zero())?;
        Ok(self.next_hash())
    }

    async fn transfer_native(
        &self,
        from: &Wallet,
        to: Address,
        amount: U256,
    ) -> Result<TxHash, ChainError> {
        self.record(ChainCall::TransferNative { from: from.address(), to, amount });
        if let Some(error) = self.transfer_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Self::move_funds(&self.native, from.address(), to, amount, self.native_cost)?;
        Ok(self.next_hash())
    }

    fn native_transfer_cost(&self) -> U256 {
        self.native_cost
    }

    fn stable_decimals(&self) -> u32 {
        self.stable_decimals
    }
}

// ============================================================================
// Credentials and profiles
// ============================================================================

/// Seed phrases held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryCredentials {
    seeds: HashMap<String, SeedPhrase>,
    reads: Arc<Mutex<Vec<String>>>,
}

impl InMemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, profile_id: &str, phrase: &str) -> Self {
        self.seeds.insert(profile_id.to_string(), SeedPhrase::new(phrase));
        self
    }

    /// Profile ids whose seed was requested
    pub fn get_reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }
}

impl CredentialStore for InMemoryCredentials {
    fn seed_phrase(&self, profile_id: &str) -> Result<SeedPhrase, CredentialError> {
        self.reads.lock().unwrap().push(profile_id.to_string());
        self.seeds
            .get(profile_id)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(profile_id.to_string()))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockProfileSource {
    profiles: Vec<Profile>,
    calls: Arc<Mutex<Vec<u32>>>,
}

impl MockProfileSource {
    pub fn new(profiles: Vec<Profile>) -> Self {
        Self {
            profiles,
            calls: Arc::default(),
        }
    }

    /// Page sizes requested
    pub fn get_calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProfileSource for MockProfileSource {
    async fn list_profiles(&self, page_size: u32) -> Result<Vec<Profile>, ProfileSourceError> {
        self.calls.lock().unwrap().push(page_size);
        Ok(self.profiles.iter().take(page_size as usize).cloned().collect())
    }
}
