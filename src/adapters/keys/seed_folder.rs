//! Seed Folder Credential Store
//!
//! One file per profile: `{folder}/{profile_id}.txt`. The seed phrase is the
//! first comma-separated field of the first non-empty line.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::domain::SeedPhrase;
use crate::ports::{CredentialError, CredentialStore};

#[derive(Debug, Clone)]
pub struct SeedFolder {
    folder: PathBuf,
}

impl SeedFolder {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }

    pub fn seed_path(&self, profile_id: &str) -> PathBuf {
        self.folder.join(format!("{}.txt", profile_id))
    }
}

fn parse_seed(content: &str) -> Option<String> {
    let line = content.lines().map(str::trim).find(|l| !l.is_empty())?;
    let field = line.split(',').next()?.trim().trim_matches('"').trim();
    (!field.is_empty()).then(|| field.to_string())
}

impl CredentialStore for SeedFolder {
    fn seed_phrase(&self, profile_id: &str) -> Result<SeedPhrase, CredentialError> {
        if profile_id.is_empty() || profile_id.contains(['/', '\\']) || profile_id.contains("..") {
            return Err(CredentialError::Unreadable {
                profile_id: profile_id.to_string(),
                reason: "profile id is not a valid file name".to_string(),
            });
        }

        let path = self.seed_path(profile_id);
        let content = fs::read_to_string(&path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => CredentialError::NotFound(profile_id.to_string()),
            _ => CredentialError::Unreadable {
                profile_id: profile_id.to_string(),
                reason: format!("{}: {}", path.display(), e),
            },
        })?;

        parse_seed(&content)
            .map(SeedPhrase::new)
            .ok_or_else(|| CredentialError::Unreadable {
                profile_id: profile_id.to_string(),
                reason: format!("{} holds no seed phrase", path.display()),
            })
    }
}
