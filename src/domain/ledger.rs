//! Processed-profile Ledger
//!
//! Append-only record of profile ids whose full cycle completed. The file is
//! one id per line, read once at startup and appended after each profile.
//! Single writer, sequential access.

use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Failed to read ledger {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to append to ledger {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Refusing to record an empty profile id")]
    EmptyId,
}

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    processed: HashSet<String>,
}

impl Ledger {
    /// Load the ledger. A missing file is an empty ledger.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();

        let processed = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| LedgerError::ReadError {
                path: path.clone(),
                source,
            })?;
            parse_ids(&content)
        } else {
            HashSet::new()
        };

        tracing::info!(
            "Ledger loaded: {} processed profiles ({})",
            processed.len(),
            path.display()
        );

        Ok(Self { path, processed })
    }

    pub fn is_processed(&self, profile_id: &str) -> bool {
        self.processed.contains(profile_id.trim())
    }

    /// Durably append `profile_id`. Re-marking an id appends again; the set
    /// still counts it once.
    pub fn mark_processed(&mut self, profile_id: &str) -> Result<(), LedgerError> {
        let id = profile_id.trim();
        if id.is_empty() {
            return Err(LedgerError::EmptyId);
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| self.write_error(source))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|source| self.write_error(source))?;

        writeln!(file, "{}", id).map_err(|source| self.write_error(source))?;
        file.sync_all().map_err(|source| self.write_error(source))?;

        self.processed.insert(id.to_string());
        tracing::info!("Ledger: {} marked as processed", id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.processed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processed.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::WriteError {
            path: self.path.clone(),
            source,
        }
    }
}

/// One id per line; only the first comma-separated field counts, so files
/// written by spreadsheet tools still load.
fn parse_ids(content: &str) -> HashSet<String> {
    content
        .lines()
        .filter_map(|line| line.split(',').next())
        .map(|id| id.trim().trim_matches('"').to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let ledger = Ledger::load(dir.path().join("processed.csv")).unwrap();

        assert!(ledger.is_empty());
        assert!(!ledger.is_processed("abc"));
    }

    #[test]
    fn test_load_existing_ids() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "jb0x1a").unwrap();
        writeln!(file, "").unwrap();
        writeln!(file, "  jc2k9f  ").unwrap();
        writeln!(file, "\"jd77aa\",extra").unwrap();
        file.flush().unwrap();

        let ledger = Ledger::load(file.path()).unwrap();

        assert_eq!(ledger.len(), 3);
        assert!(ledger.is_processed("jb0x1a"));
        assert!(ledger.is_processed("jc2k9f"));
        assert!(ledger.is_processed("jd77aa"));
        assert!(!ledger.is_processed("extra"));
    }

    #[test]
    fn test_mark_processed_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("processed.csv");

        let mut ledger = Ledger::load(&path).unwrap();
        ledger.mark_processed("jb0x1a").unwrap();
        assert!(ledger.is_processed("jb0x1a"));

        let reloaded = Ledger::load(&path).unwrap();
        assert!(reloaded.is_processed("jb0x1a"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "jb0x1a\n");
    }

    #[test]
    fn test_duplicate_marks_counted_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("processed.csv");

        let mut ledger = Ledger::load(&path).unwrap();
        ledger.mark_processed("jb0x1a").unwrap();
        ledger.mark_processed("jb0x1a").unwrap();

        assert_eq!(ledger.len(), 1);
        assert_eq!(Ledger::load(&path).unwrap().len(), 1);
    }

    #[test]
    fn test_empty_id_rejected() {
        let dir = TempDir::new().unwrap();
        let mut ledger = Ledger::load(dir.path().join("processed.csv")).unwrap();

        assert!(matches!(ledger.mark_processed("   "), Err(LedgerError::EmptyId)));
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_write_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        // A directory at the ledger path makes the append fail
        let path = dir.path().join("processed.csv");
        fs::create_dir(&path).unwrap();

        let mut ledger = Ledger {
            path: path.clone(),
            processed: HashSet::new(),
        };

        let result = ledger.mark_processed("jb0x1a");
        assert!(matches!(result, Err(LedgerError::WriteError { .. })));
        assert!(!ledger.is_processed("jb0x1a"));
    }
}
