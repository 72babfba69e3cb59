//! TonAPI REST client
//!
//! Read calls go through bounded exponential backoff; broadcasting a signed
//! message is a single attempt so a timeout never turns into a double send.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::config::{Network, TonApiConfig};
use crate::error::{Error, Result};

use super::types::{
    Account, AccountEvents, ApiError, Emulation, JettonBalance, JettonsBalances, RatesResponse,
};

/// Chain-query collaborator
#[async_trait]
pub trait ChainQuery: Send + Sync {
    /// Account state; an address the chain has never seen reports balance 0
    async fn account(&self, address: &str) -> Result<Account>;

    async fn jettons(&self, address: &str) -> Result<Vec<JettonBalance>>;

    /// TON price in USD, `None` when the indexer has no rate
    async fn ton_price_usd(&self) -> Result<Option<f64>>;

    /// Newest-first page of events strictly older than `before_lt`
    async fn account_events(
        &self,
        address: &str,
        limit: u32,
        before_lt: Option<u64>,
    ) -> Result<AccountEvents>;

    /// Dry-run a signed external message
    async fn emulate(&self, boc: &str) -> Result<Emulation>;

    /// Broadcast a signed external message (never retried)
    async fn send_message(&self, boc: &str) -> Result<()>;
}

/// Bounded retry settings for read calls
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &TonApiConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.base_delay,
            max_interval: self.base_delay * 8,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

/// TonAPI v2 client
pub struct TonApiClient {
    client: Client,
    base_url: String,
    api_key: String,
    retry: RetryPolicy,
}

impl TonApiClient {
    pub fn new(config: &TonApiConfig, network: Network) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(concat!("ton-skill/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url(network),
            api_key: config.api_key.clone(),
            retry: RetryPolicy::from_config(config),
        })
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_key)
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = self.authorize(request).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ApiError>(&body)
            .map(|e| e.error)
            .unwrap_or_else(|_| body.chars().take(200).collect());

        Err(status_error(status, message))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let response = self.send(self.client.get(&url).query(query)).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| Error::Serialization(format!("Invalid response from {}: {}", path, e)))
    }

    /// Run a read call with bounded retries on transient failures
    async fn with_retry<T, F, Fut>(&self, op: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let attempts = AtomicU32::new(0);
        let max_retries = self.retry.max_retries;

        retry(self.retry.backoff(), || async {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed);
            match f().await {
                Ok(value) => Ok(value),
                Err(e) if e.is_retryable() && attempt < max_retries => {
                    warn!("{} failed (attempt {}): {}, retrying", op, attempt + 1, e);
                    Err(backoff::Error::transient(e))
                }
                Err(e) => {
                    if e.is_retryable() {
                        error!("{} failed after {} attempts: {}", op, attempt + 1, e);
                    }
                    Err(backoff::Error::permanent(e))
                }
            }
        })
        .await
    }
}

/// Map a non-2xx status to the error taxonomy
pub fn status_error(status: StatusCode, message: String) -> Error {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        Error::CollaboratorUnavailable(format!("TonAPI {}: {}", status.as_u16(), message))
    } else {
        Error::CollaboratorRejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl ChainQuery for TonApiClient {
    async fn account(&self, address: &str) -> Result<Account> {
        let path = format!("/v2/accounts/{}", address);
        let result = self
            .with_retry("account", || self.get_json::<Account>(&path, &[]))
            .await;

        match result {
            Err(Error::CollaboratorRejected { status: 404, .. }) => {
                Ok(Account::nonexistent(address))
            }
            other => other,
        }
    }

    async fn jettons(&self, address: &str) -> Result<Vec<JettonBalance>> {
        let path = format!("/v2/accounts/{}/jettons", address);
        let query = [("currencies", "usd".to_string())];
        let page: JettonsBalances = self
            .with_retry("jettons", || self.get_json(&path, &query))
            .await?;
        Ok(page.balances)
    }

    async fn ton_price_usd(&self) -> Result<Option<f64>> {
        let query = [
            ("tokens", "ton".to_string()),
            ("currencies", "usd".to_string()),
        ];
        let rates: RatesResponse = self
            .with_retry("rates", || self.get_json("/v2/rates", &query))
            .await?;

        Ok(rates
            .rates
            .iter()
            .find(|(token, _)| token.eq_ignore_ascii_case("ton"))
            .and_then(|(_, r)| r.prices.get("USD").copied()))
    }

    async fn account_events(
        &self,
        address: &str,
        limit: u32,
        before_lt: Option<u64>,
    ) -> Result<AccountEvents> {
        let path = format!("/v2/accounts/{}/events", address);
        let mut query = vec![("limit", limit.to_string())];
        if let Some(lt) = before_lt {
            query.push(("before_lt", lt.to_string()));
        }

        self.with_retry("account_events", || self.get_json(&path, &query))
            .await
    }

    async fn emulate(&self, boc: &str) -> Result<Emulation> {
        let url = format!("{}/v2/wallet/emulate", self.base_url);
        let body = json!({ "boc": boc });

        self.with_retry("emulate", || async {
            let response = self.send(self.client.post(&url).json(&body)).await?;
            response
                .json::<Emulation>()
                .await
                .map_err(|e| Error::Serialization(format!("Invalid emulation result: {}", e)))
        })
        .await
    }

    async fn send_message(&self, boc: &str) -> Result<()> {
        let url = format!("{}/v2/blockchain/message", self.base_url);
        self.send(self.client.post(&url).json(&json!({ "boc": boc })))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(status_error(StatusCode::BAD_GATEWAY, "down".into()).is_retryable());
        assert!(status_error(StatusCode::TOO_MANY_REQUESTS, "slow".into()).is_retryable());

        let rejected = status_error(StatusCode::BAD_REQUEST, "bad boc".into());
        assert!(!rejected.is_retryable());
        assert!(matches!(
            rejected,
            Error::CollaboratorRejected { status: 400, .. }
        ));
    }

    #[tokio::test]
    async fn test_retry_is_bounded_and_skips_permanent_errors() {
        let config = TonApiConfig {
            max_retries: 2,
            retry_base_delay_ms: 1,
            ..Default::default()
        };
        let client = TonApiClient::new(&config, Network::Mainnet).unwrap();

        let calls = AtomicU32::new(0);
        let result: Result<()> = client
            .with_retry("test", || async {
                calls.fetch_add(1, Ordering::Relaxed);
                Err(Error::CollaboratorUnavailable("down".into()))
            })
            .await;
        assert!(matches!(result, Err(Error::CollaboratorUnavailable(_))));
        assert_eq!(calls.load(Ordering::Relaxed), 3);

        let calls = AtomicU32::new(0);
        let result: Result<()> = client
            .with_retry("test", || async {
                calls.fetch_add(1, Ordering::Relaxed);
                Err(Error::InvalidInput("nope".into()))
            })
            .await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
    }
}
