use thiserror::Error;

use crate::domain::SeedPhrase;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("No seed phrase stored for profile {0}")]
    NotFound(String),

    #[error("Failed to read seed for profile {profile_id}: {reason}")]
    Unreadable { profile_id: String, reason: String },
}

/// Per-profile seed phrase lookup, read on demand
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore: Send + Sync {
    fn seed_phrase(&self, profile_id: &str) -> Result<SeedPhrase, CredentialError>;
}
