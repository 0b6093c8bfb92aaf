//! HTTP mail provider backend.
//!
//! The provider issues short-lived access tokens from a client id and
//! secret. The token lives in an explicitly owned [`TokenCache`] handed
//! to the mailer, not in process-wide state: expiry is compared against
//! the monotonic clock with a refresh skew, and the check happens before
//! every use rather than trusting a shared "still valid" flag, so a
//! token can never be used after it lapses mid-flight.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::{Email, Mailer};
use crate::error::{AppError, Result};

/// Refresh this long before nominal expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// Configuration for the HTTP mail provider.
#[derive(Clone)]
pub struct ApiMailerConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub sender_name: String,
    pub sender_address: String,
    pub timeout_seconds: u64,
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Owned, lazily refreshed credential holder.
#[derive(Default)]
pub struct TokenCache {
    current: Mutex<Option<CachedToken>>,
}

impl TokenCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A token valid for at least the skew window, if one is cached.
    fn valid_token(&self) -> Option<String> {
        let current = self.current.lock().unwrap();
        current.as_ref().and_then(|token| {
            if Instant::now() + EXPIRY_SKEW < token.expires_at {
                Some(token.value.clone())
            } else {
                None
            }
        })
    }

    fn store(&self, value: String, expires_in: Duration) {
        let mut current = self.current.lock().unwrap();
        *current = Some(CachedToken {
            value,
            expires_at: Instant::now() + expires_in,
        });
    }

    fn invalidate(&self) {
        *self.current.lock().unwrap() = None;
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Mailer speaking the provider's HTTP API.
pub struct ApiMailer {
    http: reqwest::Client,
    config: ApiMailerConfig,
    tokens: TokenCache,
}

impl ApiMailer {
    pub fn new(config: ApiMailerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| AppError::internal(format!("failed to build mail client: {}", e)))?;
        Ok(Self {
            http,
            config,
            tokens: TokenCache::new(),
        })
    }

    /// A token that is valid right now, refreshing if needed.
    async fn bearer_token(&self) -> Result<String> {
        if let Some(token) = self.tokens.valid_token() {
            return Ok(token);
        }

        let response = self
            .http
            .post(format!("{}/token", self.config.base_url.trim_end_matches('/')))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::internal(format!(
                "mail provider token request failed with HTTP {}",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AppError::internal(format!("unparseable token response: {}", e)))?;

        self.tokens.store(
            token.access_token.clone(),
            Duration::from_secs(token.expires_in),
        );
        Ok(token.access_token)
    }
}

#[async_trait]
impl Mailer for ApiMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        let token = self.bearer_token().await?;

        let body = serde_json::json!({
            "sender": {
                "name": self.config.sender_name,
                "email": self.config.sender_address,
            },
            "to": [{ "email": email.to }],
            "subject": email.subject,
            "htmlContent": email.html,
        });

        let response = self
            .http
            .post(format!(
                "{}/smtp/email",
                self.config.base_url.trim_end_matches('/')
            ))
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            // The provider revoked the token early; drop it so the next
            // send fetches a fresh one.
            self.tokens.invalidate();
            return Err(AppError::internal(
                "mail provider rejected the access token",
            ));
        }
        if !response.status().is_success() {
            return Err(AppError::internal(format!(
                "mail provider returned HTTP {}",
                response.status()
            )));
        }

        tracing::debug!(
            target: "trekmate::email",
            to = %email.to,
            subject = %email.subject,
            "email queued with provider"
        );
        Ok(())
    }
}
