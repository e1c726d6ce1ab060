//! Wise REST client
//!
//! Quote, transfer and status calls against the Wise platform API.
//!
//! Failure classification:
//! - network error, timeout, 5xx, 429, unparsable body -> `Unavailable`
//! - any other 4xx (incl. 404 on status) -> `Rejected`
//! - quote that does not match the request -> `Rejected`
//!
//! `Unavailable` is retried in-call with exponential backoff, bounded by
//! `max_attempts`.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, warn};

use super::PaymentProvider;
use crate::settlement::error::ProviderError;
use crate::settlement::types::{PurchaseId, Quote, TransferHandle, TransferStatus};

/// Provider statuses that mean the money reached the seller
const COMPLETED_STATUSES: &[&str] = &["outgoing_payment_sent"];

/// Provider statuses that end the transfer without payout
const FAILED_STATUSES: &[&str] = &["cancelled", "funds_refunded", "bounced_back", "charged_back"];

#[derive(Debug, Clone)]
pub struct WiseConfig {
    pub base_url: String,
    pub api_key: String,
    /// Business profile funding the transfers
    pub profile_id: String,
    pub request_timeout: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl WiseConfig {
    /// Delay before retry number `attempt` (1-based)
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }
}

pub struct WiseClient {
    config: WiseConfig,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QuoteRequest<'a> {
    #[serde(serialize_with = "decimal_as_number")]
    source_amount: Decimal,
    source_currency: &'a str,
    target_currency: &'a str,
    profile: &'a str,
    preferred_pay_in: &'static str,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    id: String,
    #[serde(deserialize_with = "decimal_from_json")]
    source_amount: Decimal,
    source_currency: String,
    target_currency: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferRequest<'a> {
    target_account: &'a str,
    quote_uuid: &'a str,
    customer_transaction_id: String,
    details: TransferDetails<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferDetails<'a> {
    reference: &'a str,
    source_of_funds: &'static str,
}

#[derive(Deserialize, Debug)]
struct TransferResponse {
    #[serde(deserialize_with = "id_from_json")]
    id: String,
}

#[derive(Deserialize, Debug)]
struct StatusResponse {
    status: String,
}

impl WiseClient {
    pub fn new(config: WiseConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                ProviderError::Unavailable(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Send one request and decode a 2xx JSON body
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = request
            .bearer_auth(&self.config.api_key)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("HTTP request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Unavailable(format!("Failed to parse response: {}", e)))
    }

    /// Run `call` until it succeeds, is rejected, or attempts run out
    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.config.backoff_delay(attempt);
                    warn!(
                        provider = "wise",
                        op,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl PaymentProvider for WiseClient {
    fn name(&self) -> &'static str {
        "wise"
    }

    async fn create_quote(
        &self,
        amount: Decimal,
        source_currency: &str,
        target_currency: &str,
    ) -> Result<Quote, ProviderError> {
        if amount <= Decimal::ZERO {
            return Err(ProviderError::Rejected(format!(
                "Quote amount must be positive, got {}",
                amount
            )));
        }

        let body = QuoteRequest {
            source_amount: amount,
            source_currency,
            target_currency,
            profile: &self.config.profile_id,
            preferred_pay_in: "BALANCE",
        };
        let url = self.url("/v3/quotes");

        let resp: QuoteResponse = self
            .with_retry("create_quote", || self.send(self.client.post(&url).json(&body)))
            .await?;

        let quote = validate_quote(resp, amount, source_currency, target_currency)?;
        debug!(quote_id = %quote.id, amount = %amount, "Quote created");
        Ok(quote)
    }

    async fn create_transfer(
        &self,
        quote_id: &str,
        idempotency_key: PurchaseId,
        destination_account: &str,
        reference: &str,
    ) -> Result<TransferHandle, ProviderError> {
        let body = TransferRequest {
            target_account: destination_account,
            quote_uuid: quote_id,
            customer_transaction_id: idempotency_key.as_uuid().to_string(),
            details: TransferDetails {
                reference,
                source_of_funds: "other",
            },
        };
        let url = self.url("/v1/transfers");

        let resp: TransferResponse = self
            .with_retry("create_transfer", || {
                self.send(self.client.post(&url).json(&body))
            })
            .await?;

        if resp.id.is_empty() {
            return Err(ProviderError::Rejected(
                "Transfer response carried an empty id".to_string(),
            ));
        }

        debug!(purchase_id = %idempotency_key, transfer_id = %resp.id, "Transfer created");
        Ok(TransferHandle {
            transfer_id: resp.id,
        })
    }

    async fn get_transfer_status(
        &self,
        transfer_id: &str,
    ) -> Result<TransferStatus, ProviderError> {
        let url = self.url(&format!("/v1/transfers/{}", transfer_id));

        let resp: StatusResponse = self
            .with_retry("get_transfer_status", || self.send(self.client.get(&url)))
            .await?;

        Ok(map_transfer_status(&resp.status))
    }
}

fn classify_status(status: StatusCode, body: &str) -> ProviderError {
    let msg = format!("HTTP {}: {}", status.as_u16(), body.trim());
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        ProviderError::Unavailable(msg)
    } else {
        ProviderError::Rejected(msg)
    }
}

fn validate_quote(
    resp: QuoteResponse,
    amount: Decimal,
    source_currency: &str,
    target_currency: &str,
) -> Result<Quote, ProviderError> {
    if resp.id.is_empty() {
        return Err(ProviderError::Rejected("Quote response carried an empty id".into()));
    }
    if resp.source_amount != amount {
        return Err(ProviderError::Rejected(format!(
            "Quote amount mismatch: requested {}, got {}",
            amount, resp.source_amount
        )));
    }
    if !resp.source_currency.eq_ignore_ascii_case(source_currency)
        || !resp.target_currency.eq_ignore_ascii_case(target_currency)
    {
        return Err(ProviderError::Rejected(format!(
            "Quote currency mismatch: requested {}->{}, got {}->{}",
            source_currency, target_currency, resp.source_currency, resp.target_currency
        )));
    }

    Ok(Quote {
        id: resp.id,
        source_amount: resp.source_amount,
        source_currency: resp.source_currency,
        target_currency: resp.target_currency,
    })
}

pub fn map_transfer_status(status: &str) -> TransferStatus {
    if COMPLETED_STATUSES.contains(&status) {
        TransferStatus::Completed
    } else if FAILED_STATUSES.contains(&status) {
        TransferStatus::Failed
    } else {
        TransferStatus::Pending
    }
}

fn decimal_as_number<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
    let number: serde_json::Number = value
        .to_string()
        .parse()
        .map_err(serde::ser::Error::custom)?;
    number.serialize(serializer)
}

fn decimal_from_json<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
    let raw = match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s,
        other => return Err(de::Error::custom(format!("expected decimal, got {}", other))),
    };
    raw.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&raw))
        .map_err(de::Error::custom)
}

/// Transfer ids are numeric on the wire; keep them as strings
fn id_from_json<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => Ok(n.to_string()),
        serde_json::Value::String(s) => Ok(s),
        other => Err(de::Error::custom(format!("expected id, got {}", other))),
    }
}
