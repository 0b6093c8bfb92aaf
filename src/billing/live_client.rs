//! Production client for the external billing authority.
//!
//! Speaks the authority's REST API directly: form-encoded requests,
//! bearer auth with a secret key, a bounded per-request timeout, and
//! capped exponential backoff on transient failures (429, 5xx,
//! timeouts). Everything else surfaces as a typed authority error.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::client::{
    BillingAuthorityClient, CheckoutSession, CheckoutSessionDetails, CreateCheckoutSessionRequest,
    CreateCustomerRequest, SubscriptionDetails,
};
use super::error::BillingError;
use crate::error::{AppError, Result};

const DEFAULT_BASE_URL: &str = "https://api.stripe.com";

/// Configuration for the live client.
#[derive(Debug, Clone)]
pub struct LiveClientConfig {
    /// Maximum retry attempts for transient failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff, in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on the backoff delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Per-request timeout, in seconds.
    pub timeout_seconds: u64,
    /// API base URL; overridable for test servers.
    pub base_url: String,
}

impl Default for LiveClientConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            timeout_seconds: 30,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl LiveClientConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

/// Error returned when the API key fails format validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidApiKeyError {
    pub reason: String,
}

impl std::fmt::Display for InvalidApiKeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid billing API key: {}", self.reason)
    }
}

impl std::error::Error for InvalidApiKeyError {}

fn validate_api_key(key: &str) -> std::result::Result<(), InvalidApiKeyError> {
    const MIN_KEY_LENGTH: usize = 20;

    if key.len() < MIN_KEY_LENGTH {
        return Err(InvalidApiKeyError {
            reason: format!("key too short (minimum {} characters)", MIN_KEY_LENGTH),
        });
    }
    let valid_prefixes = ["sk_test_", "sk_live_", "rk_test_", "rk_live_"];
    if !valid_prefixes.iter().any(|p| key.starts_with(p)) {
        return Err(InvalidApiKeyError {
            reason: "key must start with sk_test_, sk_live_, rk_test_, or rk_live_".to_string(),
        });
    }
    Ok(())
}

/// Live billing authority client.
#[derive(Clone)]
pub struct LiveBillingClient {
    http: reqwest::Client,
    api_key: SecretString,
    config: LiveClientConfig,
}

impl LiveBillingClient {
    /// Create a client, validating the key format up front so a
    /// misconfigured deployment fails at startup rather than on the
    /// first checkout.
    pub fn new(
        api_key: SecretString,
        config: LiveClientConfig,
    ) -> std::result::Result<Self, InvalidApiKeyError> {
        validate_api_key(api_key.expose_secret())?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| InvalidApiKeyError {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            api_key,
            config,
        })
    }

    #[must_use]
    pub fn is_test_mode(&self) -> bool {
        let key = self.api_key.expose_secret();
        key.starts_with("sk_test_") || key.starts_with("rk_test_")
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Send a request, retrying transient failures with capped backoff.
    async fn send_with_retry(
        &self,
        operation: &str,
        build: impl Fn() -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let mut attempts = 0u32;
        loop {
            let result = build()
                .bearer_auth(self.api_key.expose_secret())
                .send()
                .await;

            match result {
                Ok(response) => {
                    let status = response.status();
                    let transient = status.as_u16() == 429 || status.is_server_error();
                    if !transient {
                        return Ok(response);
                    }
                    if attempts >= self.config.max_retries {
                        return Err(BillingError::AuthorityApi {
                            operation: operation.to_string(),
                            message: format!("still failing after {} retries", attempts),
                            http_status: Some(status.as_u16()),
                        }
                        .into());
                    }
                    tracing::warn!(
                        target: "trekmate::billing::authority",
                        operation = operation,
                        attempt = attempts + 1,
                        status = status.as_u16(),
                        "transient authority error, retrying"
                    );
                }
                Err(err) if err.is_timeout() || err.is_connect() => {
                    if attempts >= self.config.max_retries {
                        return Err(BillingError::AuthorityTimeout {
                            operation: operation.to_string(),
                            timeout_seconds: self.config.timeout_seconds,
                        }
                        .into());
                    }
                    tracing::warn!(
                        target: "trekmate::billing::authority",
                        operation = operation,
                        attempt = attempts + 1,
                        error = %err,
                        "authority unreachable, retrying"
                    );
                }
                Err(err) => {
                    return Err(BillingError::AuthorityApi {
                        operation: operation.to_string(),
                        message: err.to_string(),
                        http_status: None,
                    }
                    .into());
                }
            }

            tokio::time::sleep(backoff_delay(attempts, &self.config)).await;
            attempts += 1;
        }
    }

    /// Decode a successful response or map the authority's error body.
    async fn decode<T: serde::de::DeserializeOwned>(
        operation: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                AppError::from(BillingError::AuthorityApi {
                    operation: operation.to_string(),
                    message: format!("unparseable response body: {}", e),
                    http_status: Some(status.as_u16()),
                })
            });
        }

        let message = response
            .json::<ApiErrorEnvelope>()
            .await
            .ok()
            .and_then(|envelope| envelope.error.message)
            .unwrap_or_else(|| format!("HTTP {}", status));

        Err(BillingError::AuthorityApi {
            operation: operation.to_string(),
            message,
            http_status: Some(status.as_u16()),
        }
        .into())
    }
}

impl std::fmt::Debug for LiveBillingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveBillingClient")
            .field("config", &self.config)
            .field("is_test_mode", &self.is_test_mode())
            .finish_non_exhaustive()
    }
}

fn backoff_delay(attempts: u32, config: &LiveClientConfig) -> Duration {
    let exp = config
        .base_delay_ms
        .saturating_mul(1u64 << attempts.min(16));
    Duration::from_millis(exp.min(config.max_delay_ms))
}

#[async_trait]
impl BillingAuthorityClient for LiveBillingClient {
    async fn create_customer(&self, request: CreateCustomerRequest) -> Result<String> {
        let mut form = vec![
            ("email".to_string(), request.email.clone()),
            (
                "metadata[account_id]".to_string(),
                request.account_id.clone(),
            ),
        ];
        if let Some(name) = &request.name {
            form.push(("name".to_string(), name.clone()));
        }

        let response = self
            .send_with_retry("create_customer", || {
                self.http.post(self.url("/v1/customers")).form(&form)
            })
            .await?;
        let customer: ApiCustomer = Self::decode("create_customer", response).await?;
        Ok(customer.id)
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession> {
        let mut form = vec![
            ("mode".to_string(), "subscription".to_string()),
            ("customer".to_string(), request.customer_ref.clone()),
            ("line_items[0][price]".to_string(), request.price_id.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
        ];
        for (key, value) in &request.metadata {
            form.push((format!("metadata[{}]", key), value.clone()));
        }

        let response = self
            .send_with_retry("create_checkout_session", || {
                self.http
                    .post(self.url("/v1/checkout/sessions"))
                    .form(&form)
            })
            .await?;
        let session: ApiCheckoutSession =
            Self::decode("create_checkout_session", response).await?;

        let url = session.url.ok_or_else(|| {
            AppError::from(BillingError::AuthorityApi {
                operation: "create_checkout_session".to_string(),
                message: "session created without a redirect URL".to_string(),
                http_status: None,
            })
        })?;
        Ok(CheckoutSession {
            id: session.id,
            url,
        })
    }

    async fn get_checkout_session(&self, session_id: &str) -> Result<CheckoutSessionDetails> {
        let path = format!("/v1/checkout/sessions/{}", session_id);
        let response = self
            .send_with_retry("get_checkout_session", || self.http.get(self.url(&path)))
            .await?;
        let session: ApiCheckoutSession = Self::decode("get_checkout_session", response).await?;
        Ok(CheckoutSessionDetails {
            id: session.id,
            payment_status: session.payment_status.unwrap_or_else(|| "unpaid".to_string()),
            customer_ref: session.customer,
            subscription_ref: session.subscription,
            metadata: session.metadata.unwrap_or_default(),
        })
    }

    async fn get_subscription(&self, subscription_ref: &str) -> Result<SubscriptionDetails> {
        let path = format!("/v1/subscriptions/{}", subscription_ref);
        let response = self
            .send_with_retry("get_subscription", || self.http.get(self.url(&path)))
            .await?;
        let subscription: ApiSubscription = Self::decode("get_subscription", response).await?;
        Ok(SubscriptionDetails {
            id: subscription.id,
            status: subscription.status,
            customer_ref: subscription.customer,
            current_period_end: subscription.current_period_end,
        })
    }

    async fn cancel_subscription(&self, subscription_ref: &str) -> Result<()> {
        let path = format!("/v1/subscriptions/{}", subscription_ref);
        let response = self
            .send_with_retry("cancel_subscription", || self.http.delete(self.url(&path)))
            .await?;
        let _: ApiSubscription = Self::decode("cancel_subscription", response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiCustomer {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiCheckoutSession {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
    customer: Option<String>,
    subscription: Option<String>,
    metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct ApiSubscription {
    id: String,
    status: String,
    customer: String,
    current_period_end: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_format_is_validated() {
        assert!(validate_api_key("sk_test_1234567890abcdef").is_ok());
        assert!(validate_api_key("rk_live_1234567890abcdef").is_ok());
        assert!(validate_api_key("").is_err());
        assert!(validate_api_key("sk_test_short").is_err());
        assert!(validate_api_key("pk_test_1234567890abcdef").is_err());
    }

    #[test]
    fn client_rejects_bad_key_at_construction() {
        let result = LiveBillingClient::new(
            SecretString::new("not-a-key".to_string()),
            LiveClientConfig::default(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_mode_detection() {
        let client = LiveBillingClient::new(
            SecretString::new("sk_test_1234567890abcdef".to_string()),
            LiveClientConfig::default(),
        )
        .unwrap();
        assert!(client.is_test_mode());
    }

    #[test]
    fn backoff_grows_and_caps() {
        let config = LiveClientConfig::default();
        assert_eq!(backoff_delay(0, &config), Duration::from_millis(500));
        assert_eq!(backoff_delay(1, &config), Duration::from_millis(1000));
        assert_eq!(backoff_delay(2, &config), Duration::from_millis(2000));
        assert_eq!(backoff_delay(10, &config), Duration::from_millis(30_000));
    }

    #[test]
    fn debug_output_hides_the_key() {
        let client = LiveBillingClient::new(
            SecretString::new("sk_test_1234567890abcdef".to_string()),
            LiveClientConfig::default(),
        )
        .unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("sk_test_1234567890abcdef"));
    }
}
