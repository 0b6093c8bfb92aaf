use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::billing::plans::FreeTierLimits;
use crate::error::{AppError, Result};

/// Main configuration for the trekmate service.
#[derive(Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    /// Base URL of the web client; checkout redirect targets derive from it.
    pub client_url: String,
    pub jwt: JwtConfig,
    pub billing: BillingSettings,
    pub free_tier: FreeTierLimits,
    pub email: EmailSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// JWT verification settings. Token issuance lives with the identity
/// service; this service only verifies.
#[derive(Clone)]
pub struct JwtConfig {
    pub access_token_secret: SecretString,
}

/// Settings for the external billing authority.
#[derive(Clone)]
pub struct BillingSettings {
    pub secret_key: SecretString,
    pub webhook_secret: SecretString,
    pub monthly_price_id: String,
    pub yearly_price_id: String,
    /// Bound on every outbound call to the authority, in seconds.
    pub timeout_seconds: u64,
}

/// Settings for the outbound mail integration.
#[derive(Clone)]
pub struct EmailSettings {
    pub api_base_url: String,
    pub client_id: String,
    pub client_secret: SecretString,
    pub sender_name: String,
    pub sender_address: String,
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).map_err(|_| {
        AppError::internal(format!(
            "Environment variable {} is required but was not provided",
            name
        ))
    })
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Builder for [`Config`] with environment variable support.
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    server: ServerConfig,
    logging: LoggingConfig,
    client_url: Option<String>,
    jwt: Option<JwtConfig>,
    billing: Option<BillingSettings>,
    free_tier: FreeTierLimits,
    email: Option<EmailSettings>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            client_url: None,
            jwt: None,
            billing: None,
            free_tier: FreeTierLimits::default(),
            email: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    pub fn with_client_url(mut self, url: impl Into<String>) -> Self {
        self.client_url = Some(url.into());
        self
    }

    pub fn with_jwt(mut self, jwt: JwtConfig) -> Self {
        self.jwt = Some(jwt);
        self
    }

    pub fn with_billing(mut self, billing: BillingSettings) -> Self {
        self.billing = Some(billing);
        self
    }

    pub fn with_free_tier(mut self, free_tier: FreeTierLimits) -> Self {
        self.free_tier = free_tier;
        self
    }

    pub fn with_email(mut self, email: EmailSettings) -> Self {
        self.email = Some(email);
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Required variables fail at `build()`, not here, so callers can
    /// still override programmatically after loading.
    pub fn from_env(mut self) -> Self {
        if let Some(host) = optional_env("HOST") {
            self.server.host = host;
        }
        if let Some(port) = optional_env("PORT").and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
        if let Some(level) = optional_env("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = optional_env("LOG_JSON") {
            self.logging.json = json.parse().unwrap_or(false);
        }
        if let Some(url) = optional_env("CLIENT_URL") {
            self.client_url = Some(url);
        }
        if let Some(secret) = optional_env("JWT_ACCESS_TOKEN_SECRET") {
            self.jwt = Some(JwtConfig {
                access_token_secret: SecretString::new(secret),
            });
        }
        if let (Some(secret_key), Some(webhook_secret)) = (
            optional_env("STRIPE_SECRET_KEY"),
            optional_env("STRIPE_WEBHOOK_SECRET"),
        ) {
            self.billing = Some(BillingSettings {
                secret_key: SecretString::new(secret_key),
                webhook_secret: SecretString::new(webhook_secret),
                monthly_price_id: optional_env("STRIPE_MONTHLY_PRICE_ID").unwrap_or_default(),
                yearly_price_id: optional_env("STRIPE_YEARLY_PRICE_ID").unwrap_or_default(),
                timeout_seconds: optional_env("STRIPE_TIMEOUT_SECONDS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
            });
        }
        if let Some(max) = optional_env("FREE_TIER_MAX_TRAVEL_PLANS").and_then(|v| v.parse().ok()) {
            self.free_tier.max_travel_plans = max;
        }
        if let Some(base_url) = optional_env("EMAIL_API_BASE_URL") {
            self.email = Some(EmailSettings {
                api_base_url: base_url,
                client_id: optional_env("EMAIL_CLIENT_ID").unwrap_or_default(),
                client_secret: SecretString::new(
                    optional_env("EMAIL_CLIENT_SECRET").unwrap_or_default(),
                ),
                sender_name: optional_env("EMAIL_SENDER_NAME")
                    .unwrap_or_else(|| "Trekmate".to_string()),
                sender_address: optional_env("EMAIL_SENDER_ADDRESS").unwrap_or_default(),
            });
        }
        self
    }

    /// Build the configuration, validating required settings.
    pub fn build(self) -> Result<Config> {
        let server = self.server;
        server.addr().map_err(|e| {
            AppError::internal(format!(
                "Invalid server address {}:{} - {}",
                server.host, server.port, e
            ))
        })?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(AppError::internal(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        let client_url = match self.client_url {
            Some(url) => url,
            None => require_env("CLIENT_URL")?,
        };
        let jwt = match self.jwt {
            Some(jwt) => jwt,
            None => JwtConfig {
                access_token_secret: SecretString::new(require_env("JWT_ACCESS_TOKEN_SECRET")?),
            },
        };
        let billing = match self.billing {
            Some(billing) => billing,
            None => BillingSettings {
                secret_key: SecretString::new(require_env("STRIPE_SECRET_KEY")?),
                webhook_secret: SecretString::new(require_env("STRIPE_WEBHOOK_SECRET")?),
                monthly_price_id: require_env("STRIPE_MONTHLY_PRICE_ID")?,
                yearly_price_id: require_env("STRIPE_YEARLY_PRICE_ID")?,
                timeout_seconds: 30,
            },
        };
        let email = match self.email {
            Some(email) => email,
            None => EmailSettings {
                api_base_url: require_env("EMAIL_API_BASE_URL")?,
                client_id: require_env("EMAIL_CLIENT_ID")?,
                client_secret: SecretString::new(require_env("EMAIL_CLIENT_SECRET")?),
                sender_name: "Trekmate".to_string(),
                sender_address: require_env("EMAIL_SENDER_ADDRESS")?,
            },
        };

        if billing.timeout_seconds == 0 {
            return Err(AppError::internal(
                "Billing authority timeout must be greater than 0",
            ));
        }

        Ok(Config {
            server,
            logging: self.logging,
            client_url,
            jwt,
            billing,
            free_tier: self.free_tier,
            email,
        })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
