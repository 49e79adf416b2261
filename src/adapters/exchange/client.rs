//! Exchange API Client
//!
//! HTTP client for the perpetuals exchange. Commands are signed by the bound
//! profile wallet: the JSON body is signed (EIP-191) and the signature sent in
//! the `x-signature` header together with the account nonce.

use std::time::Duration;

use async_trait::async_trait;
use ethers::signers::Signer;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::Wallet;
use crate::ports::{ExchangeAck, ExchangeError, ExchangePort, OpenOrder};

use super::types::{CloseRequest, CommandResponse, NonceResponse, OpenRequest, PositionsResponse};

/// Exchange client configuration
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Base URL of the REST API
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl ExchangeConfig {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

/// Wallet currently bound to the session
#[derive(Debug)]
struct Session {
    wallet: Wallet,
    nonce: std::sync::atomic::AtomicU64,
}

/// Perpetuals exchange REST client
#[derive(Debug)]
pub struct ExchangeClient {
    config: ExchangeConfig,
    http: Client,
    session: Option<Session>,
}

impl ExchangeClient {
    pub fn new(config: ExchangeConfig) -> Result<Self, ExchangeError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ExchangeError::HttpError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http,
            session: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn bound_address(&self) -> Option<ethers::types::Address> {
        self.session.as_ref().map(|s| s.wallet.address())
    }

    fn session(&self) -> Result<&Session, ExchangeError> {
        self.session.as_ref().ok_or(ExchangeError::NotBound)
    }

    async fn fetch_nonce(&self, wallet: &Wallet) -> Result<u64, ExchangeError> {
        let url = format!("{}/accounts/{:?}/nonce", self.config.base_url, wallet.address());
        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExchangeError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: NonceResponse = response.json().await?;
        Ok(body.nonce)
    }

    /// Sign `body` with the session wallet and POST it to `path`
    async fn send_command<T: Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<ExchangeAck, ExchangeError> {
        let session = self.session()?;
        let payload =
            serde_json::to_vec(body).map_err(|e| ExchangeError::DecodeError(e.to_string()))?;
        let signature = session
            .wallet
            .signer()
            .sign_message(&payload)
            .await
            .map_err(|e| ExchangeError::SigningError(e.to_string()))?;

        let url = format!("{}{}", self.config.base_url, path);
        tracing::debug!("POST {}", url);

        let response = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .header("x-signature", format!("0x{}", signature))
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        // Signed commands consume the nonce even when rejected
        session.nonce.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        Ok(ack_from(status, &text))
    }

    fn next_nonce(&self) -> Result<u64, ExchangeError> {
        Ok(self.session()?.nonce.load(std::sync::atomic::Ordering::SeqCst))
    }
}

/// Error code given to a 2xx reply whose body is not a JSON command response
pub const UNPARSABLE_RESPONSE: &str = "UNPARSABLE_RESPONSE";

/// Build the acknowledgement from HTTP status and raw body
pub fn ack_from(status: StatusCode, body: &str) -> ExchangeAck {
    let raw = body.trim();
    let parsed: CommandResponse = match serde_json::from_str(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!("Exchange reply (status {}) is not JSON: {}: {:?}", status, e, raw);
            // An unreadable 200 is not an acceptance
            let error_code = if status.is_success() {
                UNPARSABLE_RESPONSE.to_string()
            } else {
                String::new()
            };
            return ExchangeAck {
                status_code: status.as_u16(),
                error_code,
                message: (!raw.is_empty()).then(|| raw.to_string()),
            };
        }
    };

    let (error_code, message) = parsed
        .error
        .map(|e| (e.code_text(), e.message))
        .unwrap_or_default();

    let message =
        message.or_else(|| (!status.is_success() && !raw.is_empty()).then(|| raw.to_string()));

    ExchangeAck {
        status_code: status.as_u16(),
        error_code,
        message,
    }
}

#[async_trait]
impl ExchangePort for ExchangeClient {
    async fn bind_wallet(&mut self, wallet: &Wallet) -> Result<(), ExchangeError> {
        let nonce = self.fetch_nonce(wallet).await?;
        tracing::info!("Exchange session bound to {:?} (nonce {})", wallet.address(), nonce);

        self.session = Some(Session {
            wallet: wallet.clone(),
            nonce: std::sync::atomic::AtomicU64::new(nonce),
        });
        Ok(())
    }

    async fn has_open_position(&self, market: &str) -> Result<bool, ExchangeError> {
        let session = self.session()?;
        let url = format!("{}/positions", self.config.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[
                ("address", format!("{:?}", session.wallet.address())),
                ("market", market.to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ExchangeError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let body: PositionsResponse = response.json().await?;
        let present = body.has_position();
        tracing::debug!("Position on {}: {}", market, if present { "open" } else { "none" });
        Ok(present)
    }

    async fn open_position(&self, order: &OpenOrder) -> Result<ExchangeAck, ExchangeError> {
        let request = OpenRequest {
            address: format!("{:?}", self.session()?.wallet.address()),
            market: &order.market,
            side: order.side,
            size: order.size,
            leverage: order.leverage,
            slippage: order.slippage,
            nonce: self.next_nonce()?,
        };
        self.send_command("/orders/open", &request).await
    }

    async fn close_position(
        &self,
        market: &str,
        slippage: Decimal,
    ) -> Result<ExchangeAck, ExchangeError> {
        let request = CloseRequest {
            address: format!("{:?}", self.session()?.wallet.address()),
            market,
            slippage,
            nonce: self.next_nonce()?,
        };
        self.send_command("/orders/close", &request).await
    }
}
