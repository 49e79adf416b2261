//! AdsPower Local API Client
//!
//! Lists browser profiles from the AdsPower local API. Each profile is one
//! account for the rotation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::domain::Profile;
use crate::ports::{ProfileSource, ProfileSourceError};

/// Envelope of every AdsPower response; `code` 0 means success
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub code: i64,
    #[serde(default)]
    pub msg: String,
    pub data: Option<T>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserList {
    #[serde(default)]
    pub list: Vec<UserEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserEntry {
    pub user_id: String,
    #[serde(default)]
    pub name: String,
}

impl From<UserEntry> for Profile {
    fn from(entry: UserEntry) -> Self {
        Profile::new(entry.user_id, entry.name)
    }
}

#[derive(Debug, Clone)]
pub struct AdsPowerClient {
    api_url: String,
    http: Client,
}

impl AdsPowerClient {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, ProfileSourceError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProfileSourceError::RequestError(e.to_string()))?;

        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn list_url(&self) -> String {
        format!("{}/api/v1/user/list", self.api_url)
    }
}

/// Turn a decoded envelope into profiles, keeping API order
pub fn profiles_from(envelope: ApiEnvelope<UserList>) -> Result<Vec<Profile>, ProfileSourceError> {
    if envelope.code != 0 {
        return Err(ProfileSourceError::ApiError {
            code: envelope.code,
            message: envelope.msg,
        });
    }

    Ok(envelope
        .data
        .map(|d| d.list)
        .unwrap_or_default()
        .into_iter()
        .map(Profile::from)
        .collect())
}

#[async_trait]
impl ProfileSource for AdsPowerClient {
    async fn list_profiles(&self, page_size: u32) -> Result<Vec<Profile>, ProfileSourceError> {
        let response = self
            .http
            .get(self.list_url())
            .query(&[("page_size", page_size)])
            .send()
            .await
            .map_err(|e| ProfileSourceError::RequestError(e.to_string()))?;

        let envelope: ApiEnvelope<UserList> = response
            .json()
            .await
            .map_err(|e| ProfileSourceError::ParseError(e.to_string()))?;

        let profiles = profiles_from(envelope)?;
        tracing::info!("Fetched {} profiles", profiles.len());
        Ok(profiles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_url() {
        let client =
            AdsPowerClient::new("http://local.adspower.net:50325/", Duration::from_secs(5))
                .unwrap();
        assert_eq!(client.list_url(), "http://local.adspower.net:50325/api/v1/user/list");
    }

    #[test]
    fn test_profiles_keep_order() {
        let body = r#"{
            "code": 0,
            "msg": "Success",
            "data": {
                "list": [
                    {"user_id": "jb0x1a", "name": "first", "serial_number": "1"},
                    {"user_id": "jb0x1b", "name": "second"}
                ],
                "page": 1,
                "page_size": 50
            }
        }"#;
        let envelope: ApiEnvelope<UserList> = serde_json::from_str(body).unwrap();

        let profiles = profiles_from(envelope).unwrap();
        assert_eq!(
            profiles,
            vec![Profile::new("jb0x1a", "first"), Profile::new("jb0x1b", "second")]
        );
    }

    #[test]
    fn test_nonzero_code_is_error() {
        let body = r#"{"code": -1, "msg": "Too many request per second", "data": null}"#;
        let envelope: ApiEnvelope<UserList> = serde_json::from_str(body).unwrap();

        let err = profiles_from(envelope).unwrap_err();
        assert!(matches!(err, ProfileSourceError::ApiError { code: -1, .. }));
    }

    #[test]
    fn test_missing_data_is_empty() {
        let envelope: ApiEnvelope<UserList> = serde_json::from_str(r#"{"code": 0}"#).unwrap();
        assert!(profiles_from(envelope).unwrap().is_empty());
    }
}
