use serde::{Deserialize, Serialize};

/// One independently-keyed account processed by the rotator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Stable identifier, also the key of the seed file and the ledger entry
    pub id: String,
    /// Human-readable label (logging only)
    pub display_name: String,
}

impl Profile {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.id, self.display_name)
    }
}
