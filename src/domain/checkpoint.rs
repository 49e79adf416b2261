//! Cycle Checkpoint
//!
//! Crash recovery for the rotation loop. Persists the carry state
//! (previous profile, migrate flag) and the progress of the profile in
//! flight so a restart neither repeats a finished migration nor migrates
//! from a stale wallet. Private keys are never written; the previous wallet
//! is re-derived from its profile id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default checkpoint file name
pub const DEFAULT_CHECKPOINT_FILE: &str = "cycle_checkpoint.json";

#[derive(Error, Debug, Clone)]
pub enum PersistError {
    #[error("Failed to serialize checkpoint: {0}")]
    SerializationError(String),

    #[error("Failed to write checkpoint file: {0}")]
    WriteError(String),

    #[error("Failed to read checkpoint file: {0}")]
    ReadError(String),

    #[error("Checkpoint file is corrupted: {0}")]
    CorruptedFile(String),

    #[error("Failed to create directory: {0}")]
    DirectoryError(String),
}

/// Progress of the profile currently being processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveProfile {
    pub profile_id: String,
    /// Stablecoin transfer into this profile's wallet confirmed
    #[serde(default)]
    pub stable_migrated: bool,
    /// Gas transfer into this profile's wallet confirmed
    #[serde(default)]
    pub native_migrated: bool,
    /// Open/close cycles finished so far
    pub completed_iterations: u32,
}

impl ActiveProfile {
    /// Both transfers confirmed
    pub fn migration_done(&self) -> bool {
        self.stable_migrated && self.native_migrated
    }
}

/// Persisted carry state between profiles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleCheckpoint {
    /// Profile whose wallet holds the funds to migrate next
    pub previous_profile_id: Option<String>,
    pub should_migrate: bool,
    pub active: Option<ActiveProfile>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CycleCheckpoint {
    /// Start (or resume) work on `profile_id`
    pub fn begin(&mut self, profile_id: &str) {
        let resuming = self
            .active
            .as_ref()
            .is_some_and(|a| a.profile_id == profile_id);

        if !resuming {
            self.active = Some(ActiveProfile {
                profile_id: profile_id.to_string(),
                stable_migrated: false,
                native_migrated: false,
                completed_iterations: 0,
            });
        }
    }

    /// Recorded progress for `profile_id`, if it was in flight
    pub fn resume_point(&self, profile_id: &str) -> Option<&ActiveProfile> {
        self.active.as_ref().filter(|a| a.profile_id == profile_id)
    }

    pub fn record_stable_migration(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.stable_migrated = true;
        }
    }

    pub fn record_native_migration(&mut self) {
        if let Some(active) = self.active.as_mut() {
            active.native_migrated = true;
        }
    }

    pub fn record_iterations(&mut self, completed: u32) {
        if let Some(active) = self.active.as_mut() {
            active.completed_iterations = completed;
        }
    }

    /// Profile finished: its wallet becomes the migration source
    pub fn complete(&mut self, profile_id: &str) {
        self.previous_profile_id = Some(profile_id.to_string());
        self.should_migrate = true;
        self.active = None;
    }
}

/// File-backed checkpoint storage
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default checkpoint path for a data directory
    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(DEFAULT_CHECKPOINT_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint. Missing or empty file means a fresh run; a
    /// corrupt file is an error so the carry state is never silently lost.
    pub fn load(&self) -> Result<CycleCheckpoint, PersistError> {
        if !self.path.exists() {
            return Ok(CycleCheckpoint::default());
        }

        let content = fs::read_to_string(&self.path)
            .map_err(|e| PersistError::ReadError(e.to_string()))?;

        if content.trim().is_empty() {
            return Ok(CycleCheckpoint::default());
        }

        let checkpoint: CycleCheckpoint = serde_json::from_str(&content)
            .map_err(|e| PersistError::CorruptedFile(e.to_string()))?;

        tracing::info!(
            "Checkpoint loaded: previous={:?}, in flight={:?}",
            checkpoint.previous_profile_id,
            checkpoint.active.as_ref().map(|a| &a.profile_id)
        );

        Ok(checkpoint)
    }

    /// Stamp and write atomically (temp file + rename)
    pub fn save(&self, checkpoint: &mut CycleCheckpoint) -> Result<(), PersistError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| PersistError::DirectoryError(e.to_string()))?;
        }

        checkpoint.updated_at = Some(Utc::now());
        let content = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| PersistError::SerializationError(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, content).map_err(|e| PersistError::WriteError(e.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|e| PersistError::WriteError(e.to_string()))?;

        tracing::debug!("Checkpoint saved: {}", self.path.display());
        Ok(())
    }
}
