use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::Wallet;

/// HTTP status the exchange returns for an accepted command
pub const STATUS_OK: u16 = 200;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExchangeError {
    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Exchange API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    DecodeError(String),

    #[error("No wallet bound to the exchange session")]
    NotBound,

    #[error("Request signing failed: {0}")]
    SigningError(String),
}

impl ExchangeError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            ExchangeError::HttpError(_) | ExchangeError::Timeout => true,
            ExchangeError::ApiError { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ExchangeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ExchangeError::Timeout
        } else if err.is_decode() {
            ExchangeError::DecodeError(err.to_string())
        } else {
            ExchangeError::HttpError(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    #[serde(alias = "buy", alias = "BUY", alias = "long")]
    Buy,
    #[serde(alias = "sell", alias = "SELL", alias = "short")]
    Sell,
}

impl std::fmt::Display for TradeSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "Buy"),
            TradeSide::Sell => write!(f, "Sell"),
        }
    }
}

/// Fixed order the engine opens every iteration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub market: String,
    pub side: TradeSide,
    /// Collateral in stablecoin units
    pub size: Decimal,
    pub leverage: Decimal,
    /// Fractional tolerance, 0.01 = 1%
    pub slippage: Decimal,
}

/// Exchange answer to an open/close command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeAck {
    pub status_code: u16,
    /// Empty when the command was accepted
    pub error_code: String,
    pub message: Option<String>,
}

impl ExchangeAck {
    pub fn ok() -> Self {
        Self {
            status_code: STATUS_OK,
            error_code: String::new(),
            message: None,
        }
    }

    pub fn failed(status_code: u16, error_code: impl Into<String>) -> Self {
        Self {
            status_code,
            error_code: error_code.into(),
            message: None,
        }
    }

    /// Accepted iff status is 200 and no error code was set
    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK && self.error_code.is_empty()
    }
}

impl std::fmt::Display for ExchangeAck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "status {}", self.status_code)?;
        if !self.error_code.is_empty() {
            write!(f, ", error code '{}'", self.error_code)?;
        }
        if let Some(ref message) = self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

/// Presence-only view of the derivatives exchange.
///
/// Positions are never tracked by id: the account holds at most one position
/// per market and callers re-query presence before every command.
#[async_trait]
pub trait ExchangePort: Send + Sync {
    /// Rebind the session to `wallet` (credentials and account nonce)
    async fn bind_wallet(&mut self, wallet: &Wallet) -> Result<(), ExchangeError>;

    async fn has_open_position(&self, market: &str) -> Result<bool, ExchangeError>;

    async fn open_position(&self, order: &OpenOrder) -> Result<ExchangeAck, ExchangeError>;

    async fn close_position(
        &self,
        market: &str,
        slippage: Decimal,
    ) -> Result<ExchangeAck, ExchangeError>;
}
