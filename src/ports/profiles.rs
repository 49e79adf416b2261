use async_trait::async_trait;
use thiserror::Error;

use crate::domain::Profile;

#[derive(Error, Debug)]
pub enum ProfileSourceError {
    #[error("Profile API request failed: {0}")]
    RequestError(String),

    #[error("Profile API returned code {code}: {message}")]
    ApiError { code: i64, message: String },

    #[error("Failed to parse profile list: {0}")]
    ParseError(String),
}

/// Ordered list of profiles, consumed once at startup
#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn list_profiles(&self, page_size: u32) -> Result<Vec<Profile>, ProfileSourceError>;
}
