//! Application Layer - the profile rotation workflow
//!
//! Wires the ports together: wallet resolution, fund migration, the position
//! cycle engine and the orchestrator that sequences them per profile.

pub mod error;
pub mod resolver;
pub mod migration;
pub mod cycle_engine;
pub mod orchestrator;

pub use error::{Asset, FatalError, RunError, Step};
pub use resolver::WalletResolver;
pub use migration::{FundMigration, MigrationPolicy, MigrationReceipt};
pub use cycle_engine::{CycleReport, CyclePhase, Outcome, PositionCycleEngine, PositionError};
pub use orchestrator::{Carry, CycleOrchestrator, CycleSettings, RunSummary};
