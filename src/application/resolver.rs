//! Wallet Resolver
//!
//! Profile id -> seed phrase -> keypair. Failures are configuration problems,
//! never retried.

use crate::domain::{DerivationError, Wallet};
use crate::ports::{CredentialError, CredentialStore};

use super::error::FatalError;

pub struct WalletResolver<S: CredentialStore> {
    store: S,
}

impl<S: CredentialStore> WalletResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn resolve(&self, profile_id: &str) -> Result<Wallet, FatalError> {
        let seed = self.store.seed_phrase(profile_id).map_err(|e| match e {
            CredentialError::NotFound(id) => FatalError::CredentialNotFound(id),
            CredentialError::Unreadable { .. } => FatalError::CredentialNotFound(e.to_string()),
        })?;

        let wallet = Wallet::from_seed_phrase(&seed).map_err(|e| match e {
            DerivationError::InvalidMnemonic(reason)
            | DerivationError::InvalidPrivateKey(reason) => {
                FatalError::DerivationError(format!("profile {}: {}", profile_id, reason))
            }
        })?;

        tracing::debug!("Resolved wallet {:?} for profile {}", wallet.address(), profile_id);
        Ok(wallet)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}
