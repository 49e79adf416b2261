//! Exchange REST Types
//!
//! Request and response bodies for the perpetuals exchange API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ports::TradeSide;

/// `GET /accounts/{address}/nonce`
#[derive(Debug, Clone, Deserialize)]
pub struct NonceResponse {
    pub nonce: u64,
}

/// `GET /positions?address=..&market=..`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PositionsResponse {
    /// Shape varies by market; only presence matters
    #[serde(default)]
    pub data: Value,
}

impl PositionsResponse {
    pub fn has_position(&self) -> bool {
        has_content(&self.data)
    }
}

/// Null, "", [] and {} all mean "nothing open"
pub fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(items) => items.iter().any(has_content),
        Value::Object(fields) => !fields.is_empty(),
        Value::Bool(b) => *b,
        Value::Number(_) => true,
    }
}

/// Signed body of `POST /orders/open`
#[derive(Debug, Clone, Serialize)]
pub struct OpenRequest<'a> {
    pub address: String,
    pub market: &'a str,
    pub side: TradeSide,
    pub size: Decimal,
    pub leverage: Decimal,
    pub slippage: Decimal,
    pub nonce: u64,
}

/// Signed body of `POST /orders/close`
#[derive(Debug, Clone, Serialize)]
pub struct CloseRequest<'a> {
    pub address: String,
    pub market: &'a str,
    pub slippage: Decimal,
    pub nonce: u64,
}

/// Answer to an open/close command. Accepted commands omit `error` or send
/// it as null.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandResponse {
    #[serde(default)]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Error code as text; numeric codes are stringified
    pub fn code_text(&self) -> String {
        match &self.code {
            Value::Null => String::new(),
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        }
    }
}
