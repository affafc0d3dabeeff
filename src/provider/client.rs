//! Subscription provider REST client.
//!
//! Fetches current subscriber state with bounded retry. The API key is held
//! in a [`SecretString`] so it never shows up in logs or debug output.

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use std::time::Duration;

use super::retry::RetryPolicy;
use super::subscriber::{SubscriberSnapshot, extract_snapshot};
use crate::config::ProviderConfig;
use crate::error::{Result, SaucierError};

/// Client for the subscription provider's subscriber endpoint.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Fetch the current subscriber state for a user.
    ///
    /// `Ok(None)` means the provider has no subscriber for this uid (its
    /// 404), which is "no entitlement" rather than an error.
    async fn fetch_subscriber(&self, uid: &str) -> Result<Option<SubscriberSnapshot>>;
}

/// Production [`ProviderClient`] over the provider's REST API.
#[derive(Clone)]
pub struct RestProviderClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    retry: RetryPolicy,
}

impl RestProviderClient {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// Fails with `failed-precondition` when no API key is configured, or
    /// `internal` when the HTTP client cannot be constructed.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            SaucierError::failed_precondition("provider API key is not configured")
        })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.retry.timeout_seconds))
            .build()
            .map_err(|e| SaucierError::internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            retry: RetryPolicy::from_config(&config.retry),
        })
    }

    async fn fetch_once(&self, uid: &str) -> std::result::Result<Option<Value>, FetchError> {
        let url = format!("{}/v1/subscribers/{uid}", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| FetchError::Transient(format!("network error: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            // No subscriber = no entitlement, not a failure.
            return Ok(None);
        }
        if status.is_server_error() {
            return Err(FetchError::Transient(format!(
                "provider returned {status}"
            )));
        }
        if status.is_client_error() {
            return Err(FetchError::Fatal(SaucierError::failed_precondition(
                format!("provider rejected request with {status}"),
            )));
        }

        let body = response
            .json::<Value>()
            .await
            .map_err(|e| FetchError::Transient(format!("failed to read provider body: {e}")))?;
        Ok(Some(body))
    }
}

// Debug implementation that doesn't expose the API key.
impl std::fmt::Debug for RestProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestProviderClient")
            .field("base_url", &self.base_url)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProviderClient for RestProviderClient {
    async fn fetch_subscriber(&self, uid: &str) -> Result<Option<SubscriberSnapshot>> {
        let outcome = self
            .retry
            .run("fetch_subscriber", FetchError::is_transient, || {
                self.fetch_once(uid)
            })
            .await;

        match outcome {
            Ok(Some(body)) => {
                let subscriber = body.get("subscriber").unwrap_or(&body);
                Ok(Some(extract_snapshot(subscriber)))
            }
            Ok(None) => Ok(None),
            Err(FetchError::Fatal(e)) => Err(e),
            Err(FetchError::Transient(msg)) => Err(SaucierError::unavailable(format!(
                "provider unreachable after {} attempts: {msg}",
                self.retry.max_attempts
            ))),
        }
    }
}

/// Internal classification of one fetch attempt's failure.
#[derive(Debug)]
enum FetchError {
    /// Network error, timeout, or 5xx: worth retrying.
    Transient(String),
    /// 4xx other than not-found: retrying cannot help.
    Fatal(SaucierError),
}

impl FetchError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transient(msg) => write!(f, "transient: {msg}"),
            Self::Fatal(e) => write!(f, "fatal: {e}"),
        }
    }
}
