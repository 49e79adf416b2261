//! Cycle Orchestrator
//!
//! Walks the profile list in order. For each profile not yet in the ledger:
//! resolve wallet, migrate funds from the previous wallet, bind the exchange
//! session, run the position cycles, audit balances, commit to the ledger and
//! carry the wallet forward as the next migration source.

use rust_decimal::Decimal;

use crate::domain::amount::{to_base_units, to_decimal, NATIVE_DECIMALS};
use crate::domain::{
    CheckpointStore, CycleCheckpoint, Ledger, PersistError, Profile, RetryPolicy, Wallet,
};
use crate::ports::{ChainPort, CredentialStore, ExchangePort, OpenOrder};

use super::cycle_engine::{CyclePhase, PositionCycleEngine};
use super::error::{Asset, FatalError, RunError, Step};
use super::migration::{chain_error, FundMigration, MigrationPolicy};
use super::resolver::WalletResolver;

/// Everything a run needs besides its collaborators
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub order: OpenOrder,
    pub max_iterations: u32,
    pub retry: RetryPolicy,
    pub migration: MigrationPolicy,
}

impl CycleSettings {
    /// Stablecoin floor checked before migration and after the cycles
    pub fn min_stable(&self) -> Decimal {
        self.migration.min_stable
    }
}

/// State handed from one profile to the next
#[derive(Debug, Default)]
pub struct Carry {
    pub previous: Option<Wallet>,
    pub should_migrate: bool,
}

impl Carry {
    /// Carry after `wallet` finished its cycles
    pub fn after(wallet: Wallet) -> Self {
        Self {
            previous: Some(wallet),
            should_migrate: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub skipped: usize,
}

pub struct CycleOrchestrator<C: ChainPort, E: ExchangePort, S: CredentialStore> {
    chain: C,
    exchange: E,
    resolver: WalletResolver<S>,
    ledger: Ledger,
    checkpoints: Option<CheckpointStore>,
    checkpoint: CycleCheckpoint,
    settings: CycleSettings,
}

impl<C: ChainPort, E: ExchangePort, S: CredentialStore> CycleOrchestrator<C, E, S> {
    pub fn new(
        chain: C,
        exchange: E,
        resolver: WalletResolver<S>,
        ledger: Ledger,
        settings: CycleSettings,
    ) -> Self {
        Self {
            chain,
            exchange,
            resolver,
            ledger,
            checkpoints: None,
            checkpoint: CycleCheckpoint::default(),
            settings,
        }
    }

    /// Enable the durable checkpoint, loading whatever it already holds
    pub fn with_checkpoint(mut self, store: CheckpointStore) -> Result<Self, PersistError> {
        self.checkpoint = store.load()?;
        self.checkpoints = Some(store);
        Ok(self)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn checkpoint(&self) -> &CycleCheckpoint {
        &self.checkpoint
    }

    pub fn settings(&self) -> &CycleSettings {
        &self.settings
    }

    /// Process `profiles` in order. The first fatal error stops the run.
    pub async fn run(&mut self, profiles: &[Profile]) -> Result<RunSummary, RunError> {
        tracing::info!(
            "Starting rotation over {} profiles ({} already processed)",
            profiles.len(),
            self.ledger.len()
        );

        let result = self.run_profiles(profiles).await;
        match &result {
            Ok(summary) => tracing::info!(
                "Run finished: {} processed, {} skipped",
                summary.processed,
                summary.skipped
            ),
            Err(e) => tracing::error!("{}", e),
        }
        result
    }

    async fn run_profiles(&mut self, profiles: &[Profile]) -> Result<RunSummary, RunError> {
        let mut carry = self.restore_carry(profiles)?;
        let mut summary = RunSummary::default();

        for profile in profiles {
            if self.ledger.is_processed(&profile.id) {
                tracing::info!("Skipping processed profile {}", profile);
                summary.skipped += 1;
                continue;
            }

            carry = self.process_profile(profile, carry).await?;
            summary.processed += 1;
        }

        Ok(summary)
    }

    /// Rebuild the carry from the checkpoint. The previous wallet is
    /// re-derived from its profile id since keys are never persisted.
    ///
    /// An unfinished profile in the checkpoint must be the next pending
    /// profile: it may already hold the migrated funds, so its progress is
    /// never replaced by another profile's.
    fn restore_carry(&mut self, profiles: &[Profile]) -> Result<Carry, RunError> {
        // Crash between ledger commit and checkpoint write
        let committed = self
            .checkpoint
            .active
            .as_ref()
            .map(|a| a.profile_id.clone())
            .filter(|id| self.ledger.is_processed(id));
        if let Some(id) = committed {
            tracing::info!("Profile {} already committed, promoting checkpoint", id);
            self.checkpoint.complete(&id);
            persist(self.checkpoints.as_ref(), &mut self.checkpoint)
                .map_err(|e| e.at(&id, Step::Checkpoint))?;
        }

        if let Some(in_flight) = self.checkpoint.active.as_ref().map(|a| a.profile_id.clone()) {
            let next = profiles
                .iter()
                .find(|p| !self.ledger.is_processed(&p.id))
                .map(|p| p.id.clone());
            if next.as_deref() != Some(in_flight.as_str()) {
                return Err(FatalError::UnfinishedProfile { in_flight: in_flight.clone(), next }
                    .at(&in_flight, Step::RestoreCarry));
            }
        }

        let Some(previous_id) = self.checkpoint.previous_profile_id.clone() else {
            return Ok(Carry::default());
        };

        let wallet = self
            .resolver
            .resolve(&previous_id)
            .map_err(|e| e.at(&previous_id, Step::RestoreCarry))?;

        tracing::info!(
            "Restored carry: previous wallet {:?} (profile {}), migrate={}",
            wallet.address(),
            previous_id,
            self.checkpoint.should_migrate
        );

        Ok(Carry {
            previous: Some(wallet),
            should_migrate: self.checkpoint.should_migrate,
        })
    }

    async fn process_profile(
        &mut self,
        profile: &Profile,
        carry: Carry,
    ) -> Result<Carry, RunError> {
        let id = profile.id.as_str();
        tracing::info!("Processing profile {}", profile);

        let wallet = self
            .resolver
            .resolve(id)
            .map_err(|e| e.at(id, Step::ResolveWallet))?;
        tracing::info!("Wallet {:?}", wallet.address());

        self.checkpoint.begin(id);
        let (stable_done, native_done, start_iteration) = self
            .checkpoint
            .resume_point(id)
            .map(|a| (a.stable_migrated, a.native_migrated, a.completed_iterations))
            .unwrap_or_default();
        persist(self.checkpoints.as_ref(), &mut self.checkpoint)
            .map_err(|e| e.at(id, Step::Checkpoint))?;

        match carry.previous {
            Some(ref previous) if carry.should_migrate => {
                self.migrate(id, previous, &wallet, stable_done, native_done)
                    .await?
            }
            _ => tracing::info!("No previous wallet to migrate from"),
        }

        self.exchange
            .bind_wallet(&wallet)
            .await
            .map_err(|e| FatalError::Session(e.to_string()).at(id, Step::BindSession))?;

        let max_iterations = self.settings.max_iterations;
        if start_iteration > 0 {
            tracing::info!("Resuming at iteration {}/{}", start_iteration + 1, max_iterations);
        }

        let engine =
            PositionCycleEngine::new(&self.exchange, &self.settings.order, &self.settings.retry);
        let store = self.checkpoints.as_ref();
        let checkpoint = &mut self.checkpoint;
        let report = engine
            .run(start_iteration, max_iterations, |completed| {
                checkpoint.record_iterations(completed);
                persist(store, checkpoint)
            })
            .await
            .map_err(|e| e.at(id, Step::PositionCycles))?;

        if report.iteration_retries > 0 {
            tracing::info!("{} iteration retries for profile {}", report.iteration_retries, id);
        }

        self.settle().await;
        self.audit(id, &wallet).await?;

        self.ledger
            .mark_processed(id)
            .map_err(|e| FatalError::Ledger(e.to_string()).at(id, Step::CommitLedger))?;
        self.checkpoint.complete(id);
        persist(self.checkpoints.as_ref(), &mut self.checkpoint)
            .map_err(|e| e.at(id, Step::Checkpoint))?;

        tracing::info!("Profile {} done", profile);
        self.settle().await;

        Ok(Carry::after(wallet))
    }

    /// Send the migration legs not confirmed yet. Each confirmed leg is
    /// persisted before the next one starts.
    async fn migrate(
        &mut self,
        id: &str,
        previous: &Wallet,
        wallet: &Wallet,
        stable_done: bool,
        native_done: bool,
    ) -> Result<(), RunError> {
        if stable_done && native_done {
            tracing::info!("Migration already done, resuming");
            return Ok(());
        }

        tracing::info!(
            "Migrating funds {:?} -> {:?} for profile {}",
            previous.address(),
            wallet.address(),
            id
        );
        let migration = FundMigration::new(&self.chain, &self.settings.migration);

        if stable_done {
            tracing::info!("Stablecoin already migrated, sending gas only");
        } else {
            let (amount, tx) = migration.send_stable(id, previous, wallet).await?;
            tracing::info!("Stablecoin leg recorded: {} units, tx {:?}", amount, tx);
            self.checkpoint.record_stable_migration();
            persist(self.checkpoints.as_ref(), &mut self.checkpoint)
                .map_err(|e| e.at(id, Step::Checkpoint))?;
            migration.settle().await;
        }

        if !native_done {
            let (amount, tx) = migration.send_native(id, previous, wallet).await?;
            tracing::info!("Gas leg recorded: {} wei, tx {:?}", amount, tx);
            self.checkpoint.record_native_migration();
            persist(self.checkpoints.as_ref(), &mut self.checkpoint)
                .map_err(|e| e.at(id, Step::Checkpoint))?;
        }

        Ok(())
    }

    /// Post-cycle check: enough gas left for the next migration, and no
    /// position holding the stablecoin.
    async fn audit(&self, id: &str, wallet: &Wallet) -> Result<(), RunError> {
        let owner = wallet.address();

        let native = self
            .chain
            .native_balance(owner)
            .await
            .map_err(|e| chain_error(e).at(id, Step::BalanceAudit))?;
        let native_floor = to_base_units(self.settings.migration.min_native, NATIVE_DECIMALS)
            .map_err(|e| FatalError::ChainUnavailable(e.to_string()).at(id, Step::BalanceAudit))?;

        if native < native_floor {
            return Err(FatalError::InsufficientFunds {
                asset: Asset::NativeGas,
                owner: format!("{:?}", owner),
                have: to_decimal(native, NATIVE_DECIMALS),
                need: self.settings.migration.min_native,
            }
            .at(id, Step::BalanceAudit));
        }

        let decimals = self.chain.stable_decimals();
        let stable = self
            .chain
            .stable_balance(owner)
            .await
            .map_err(|e| chain_error(e).at(id, Step::BalanceAudit))?;
        let stable_floor = to_base_units(self.settings.min_stable(), decimals)
            .map_err(|e| FatalError::ChainUnavailable(e.to_string()).at(id, Step::BalanceAudit))?;

        if stable < stable_floor {
            tracing::warn!(
                "Stablecoin balance {} below {}, checking for a stray position",
                to_decimal(stable, decimals),
                self.settings.min_stable()
            );
            PositionCycleEngine::new(&self.exchange, &self.settings.order, &self.settings.retry)
                .ensure_closed(CyclePhase::Cleanup)
                .await
                .map_err(|e| {
                    FatalError::PositionCloseFailed(e.to_string()).at(id, Step::BalanceAudit)
                })?;
        }

        Ok(())
    }

    async fn settle(&self) {
        let delay = self.settings.migration.settle_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

fn persist(
    store: Option<&CheckpointStore>,
    checkpoint: &mut CycleCheckpoint,
) -> Result<(), FatalError> {
    match store {
        Some(store) => store
            .save(checkpoint)
            .map_err(|e| FatalError::Persistence(e.to_string())),
        None => Ok(()),
    }
}
