//! Billing-specific error types.
//!
//! These carry more context than the top-level `AppError` and convert
//! into it for HTTP responses.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    /// Checkout was requested while an active paid entitlement exists.
    AlreadySubscribed { account_id: String },
    /// No entitlement row exists for the account.
    NoSubscription { account_id: String },
    /// The checkout session has not been paid.
    SessionNotPaid {
        session_id: String,
        payment_status: String,
    },
    /// The session's correlation metadata names a different account.
    SessionOwnershipMismatch { session_id: String },
    /// The session or event payload is missing a field we depend on.
    MissingCorrelationMetadata {
        context: String,
        field: &'static str,
    },

    // Webhook errors
    InvalidWebhookSignature,
    WebhookTimestampExpired { age_seconds: i64 },
    InvalidWebhookPayload { message: String },

    // External authority errors
    AuthorityApi {
        operation: String,
        message: String,
        http_status: Option<u16>,
    },
    AuthorityTimeout {
        operation: String,
        timeout_seconds: u64,
    },

    /// An alternate payment backend that is intentionally inert.
    PaymentBackendDisabled { backend: &'static str },
}

impl fmt::Display for BillingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadySubscribed { account_id } => {
                write!(f, "Account '{}' already has an active subscription", account_id)
            }
            Self::NoSubscription { account_id } => {
                write!(f, "No subscription found for account '{}'", account_id)
            }
            Self::SessionNotPaid {
                session_id,
                payment_status,
            } => write!(
                f,
                "Checkout session '{}' is not paid (payment status: {})",
                session_id, payment_status
            ),
            Self::SessionOwnershipMismatch { session_id } => {
                write!(f, "Checkout session '{}' belongs to a different account", session_id)
            }
            Self::MissingCorrelationMetadata { context, field } => {
                write!(f, "Missing '{}' in {}", field, context)
            }
            Self::InvalidWebhookSignature => write!(f, "Invalid webhook signature"),
            Self::WebhookTimestampExpired { age_seconds } => {
                write!(f, "Webhook timestamp expired ({} seconds old)", age_seconds)
            }
            Self::InvalidWebhookPayload { message } => {
                write!(f, "Invalid webhook payload: {}", message)
            }
            Self::AuthorityApi {
                operation,
                message,
                http_status,
            } => {
                write!(f, "Billing authority error during '{}': {}", operation, message)?;
                if let Some(status) = http_status {
                    write!(f, " [HTTP {}]", status)?;
                }
                Ok(())
            }
            Self::AuthorityTimeout {
                operation,
                timeout_seconds,
            } => write!(
                f,
                "Billing authority did not answer '{}' within {} seconds",
                operation, timeout_seconds
            ),
            Self::PaymentBackendDisabled { backend } => {
                write!(f, "{} payments are not configured, use the card checkout instead", backend)
            }
        }
    }
}

impl std::error::Error for BillingError {}

impl From<BillingError> for crate::error::AppError {
    fn from(err: BillingError) -> Self {
        use crate::error::AppError;
        match &err {
            BillingError::AlreadySubscribed { .. } | BillingError::SessionNotPaid { .. } => {
                AppError::Conflict(err.to_string())
            }
            BillingError::SessionOwnershipMismatch { .. } => AppError::Forbidden(err.to_string()),
            BillingError::NoSubscription { .. } => AppError::NotFound(err.to_string()),
            BillingError::MissingCorrelationMetadata { .. }
            | BillingError::InvalidWebhookSignature
            | BillingError::WebhookTimestampExpired { .. }
            | BillingError::InvalidWebhookPayload { .. } => AppError::BadRequest(err.to_string()),
            BillingError::AuthorityTimeout { .. } => AppError::AuthorityUnavailable(err.to_string()),
            BillingError::AuthorityApi { http_status, .. } => match http_status {
                Some(429) | Some(500..=599) => AppError::AuthorityUnavailable(err.to_string()),
                _ => AppError::ExternalAuthority(err.to_string()),
            },
            BillingError::PaymentBackendDisabled { .. } => AppError::Unimplemented(err.to_string()),
        }
    }
}

impl BillingError {
    /// Whether retrying the operation may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AuthorityTimeout { .. } => true,
            Self::AuthorityApi { http_status, .. } => {
                matches!(http_status, Some(429) | Some(500..=599))
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn display_messages() {
        let err = BillingError::SessionNotPaid {
            session_id: "cs_1".to_string(),
            payment_status: "unpaid".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Checkout session 'cs_1' is not paid (payment status: unpaid)"
        );
    }

    #[test]
    fn conversion_to_app_error() {
        let err: AppError = BillingError::AlreadySubscribed {
            account_id: "acc_1".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Conflict(_)));

        let err: AppError = BillingError::SessionOwnershipMismatch {
            session_id: "cs_1".to_string(),
        }
        .into();
        assert!(matches!(err, AppError::Forbidden(_)));

        let err: AppError = BillingError::PaymentBackendDisabled { backend: "SSLCommerz" }.into();
        assert!(matches!(err, AppError::Unimplemented(_)));

        let err: AppError = BillingError::AuthorityTimeout {
            operation: "create_checkout_session".to_string(),
            timeout_seconds: 30,
        }
        .into();
        assert!(err.is_retryable());
    }

    #[test]
    fn retryable_classification() {
        assert!(BillingError::AuthorityApi {
            operation: "get_checkout_session".to_string(),
            message: "rate limited".to_string(),
            http_status: Some(429),
        }
        .is_retryable());

        assert!(!BillingError::AuthorityApi {
            operation: "get_checkout_session".to_string(),
            message: "no such session".to_string(),
            http_status: Some(404),
        }
        .is_retryable());

        assert!(!BillingError::InvalidWebhookSignature.is_retryable());
    }
}
