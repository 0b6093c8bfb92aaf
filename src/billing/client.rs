//! The seam to the external billing authority.
//!
//! Everything the service needs from the authority goes through
//! [`BillingAuthorityClient`], so the reconciliation logic can be tested
//! against [`mock::MockBillingClient`] without network access.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;

/// Request to create a customer with the authority.
#[derive(Debug, Clone)]
pub struct CreateCustomerRequest {
    pub email: String,
    pub name: Option<String>,
    /// Correlation back to our account, echoed in authority payloads.
    pub account_id: String,
}

/// Request to open a checkout intent.
#[derive(Debug, Clone)]
pub struct CreateCheckoutSessionRequest {
    pub customer_ref: String,
    pub price_id: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Opaque correlation metadata carried on the intent and returned
    /// unchanged by the authority.
    pub metadata: HashMap<String, String>,
}

/// A newly opened checkout intent.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub id: String,
    /// Redirect target for the client.
    pub url: String,
}

/// Authoritative state of a checkout intent, fetched on confirmation.
#[derive(Debug, Clone)]
pub struct CheckoutSessionDetails {
    pub id: String,
    /// `"paid"` once the purchase went through.
    pub payment_status: String,
    pub customer_ref: Option<String>,
    /// Assigned once the authority created the subscription.
    pub subscription_ref: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Authoritative state of a subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionDetails {
    pub id: String,
    pub status: String,
    pub customer_ref: String,
    pub current_period_end: Option<i64>,
}

/// Operations against the external billing authority.
#[async_trait]
pub trait BillingAuthorityClient: Send + Sync {
    async fn create_customer(&self, request: CreateCustomerRequest) -> Result<String>;

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutSessionRequest,
    ) -> Result<CheckoutSession>;

    async fn get_checkout_session(&self, session_id: &str) -> Result<CheckoutSessionDetails>;

    async fn get_subscription(&self, subscription_ref: &str) -> Result<SubscriptionDetails>;

    async fn cancel_subscription(&self, subscription_ref: &str) -> Result<()>;
}

/// Mock authority for tests and local development.
pub mod mock {
    use super::*;
    use crate::billing::error::BillingError;
    use std::sync::RwLock;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Debug, Clone)]
    struct MockSession {
        details: CheckoutSessionDetails,
    }

    /// Scriptable in-memory stand-in for the billing authority.
    ///
    /// Sessions start unpaid; tests flip them with
    /// [`MockBillingClient::complete_session`], which also assigns the
    /// subscription reference, mimicking the authority's lifecycle.
    #[derive(Default)]
    pub struct MockBillingClient {
        counter: AtomicU64,
        sessions: RwLock<std::collections::HashMap<String, MockSession>>,
        cancelled: RwLock<Vec<String>>,
        subscription_status: RwLock<std::collections::HashMap<String, String>>,
    }

    impl MockBillingClient {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Mark a session paid and attach a subscription reference.
        /// Returns the assigned reference.
        pub fn complete_session(&self, session_id: &str) -> String {
            let subscription_ref = format!("sub_mock_{}", self.counter.fetch_add(1, Ordering::SeqCst));
            let mut sessions = self.sessions.write().unwrap();
            if let Some(session) = sessions.get_mut(session_id) {
                session.details.payment_status = "paid".to_string();
                session.details.subscription_ref = Some(subscription_ref.clone());
            }
            self.subscription_status
                .write()
                .unwrap()
                .insert(subscription_ref.clone(), "active".to_string());
            subscription_ref
        }

        /// Override a subscription's authority-side status.
        pub fn set_subscription_status(&self, subscription_ref: &str, status: &str) {
            self.subscription_status
                .write()
                .unwrap()
                .insert(subscription_ref.to_string(), status.to_string());
        }

        /// Subscription refs cancelled through this client (for tests).
        pub fn cancelled_subscriptions(&self) -> Vec<String> {
            self.cancelled.read().unwrap().clone()
        }
    }

    #[async_trait]
    impl BillingAuthorityClient for MockBillingClient {
        async fn create_customer(&self, request: CreateCustomerRequest) -> Result<String> {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(format!("cus_mock_{}_{}", request.account_id, n))
        }

        async fn create_checkout_session(
            &self,
            request: CreateCheckoutSessionRequest,
        ) -> Result<CheckoutSession> {
            let id = format!("cs_mock_{}", self.counter.fetch_add(1, Ordering::SeqCst));
            let details = CheckoutSessionDetails {
                id: id.clone(),
                payment_status: "unpaid".to_string(),
                customer_ref: Some(request.customer_ref.clone()),
                subscription_ref: None,
                metadata: request.metadata.clone(),
            };
            self.sessions
                .write()
                .unwrap()
                .insert(id.clone(), MockSession { details });
            Ok(CheckoutSession {
                url: format!("https://checkout.mock.test/pay/{}", id),
                id,
            })
        }

        async fn get_checkout_session(&self, session_id: &str) -> Result<CheckoutSessionDetails> {
            self.sessions
                .read()
                .unwrap()
                .get(session_id)
                .map(|s| s.details.clone())
                .ok_or_else(|| {
                    BillingError::AuthorityApi {
                        operation: "get_checkout_session".to_string(),
                        message: format!("No such checkout session: {}", session_id),
                        http_status: Some(404),
                    }
                    .into()
                })
        }

        async fn get_subscription(&self, subscription_ref: &str) -> Result<SubscriptionDetails> {
            let status = self
                .subscription_status
                .read()
                .unwrap()
                .get(subscription_ref)
                .cloned()
                .ok_or_else(|| {
                    crate::error::AppError::from(BillingError::AuthorityApi {
                        operation: "get_subscription".to_string(),
                        message: format!("No such subscription: {}", subscription_ref),
                        http_status: Some(404),
                    })
                })?;
            Ok(SubscriptionDetails {
                id: subscription_ref.to_string(),
                status,
                customer_ref: "cus_mock".to_string(),
                current_period_end: None,
            })
        }

        async fn cancel_subscription(&self, subscription_ref: &str) -> Result<()> {
            self.cancelled
                .write()
                .unwrap()
                .push(subscription_ref.to_string());
            self.subscription_status
                .write()
                .unwrap()
                .insert(subscription_ref.to_string(), "canceled".to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockBillingClient;
    use super::*;

    #[tokio::test]
    async fn mock_session_lifecycle() {
        let client = MockBillingClient::new();

        let mut metadata = HashMap::new();
        metadata.insert("account_id".to_string(), "acc_1".to_string());
        let session = client
            .create_checkout_session(CreateCheckoutSessionRequest {
                customer_ref: "cus_1".to_string(),
                price_id: "price_m".to_string(),
                success_url: "https://app.test/success".to_string(),
                cancel_url: "https://app.test/cancel".to_string(),
                metadata,
            })
            .await
            .unwrap();

        let details = client.get_checkout_session(&session.id).await.unwrap();
        assert_eq!(details.payment_status, "unpaid");
        assert!(details.subscription_ref.is_none());

        let sub = client.complete_session(&session.id);
        let details = client.get_checkout_session(&session.id).await.unwrap();
        assert_eq!(details.payment_status, "paid");
        assert_eq!(details.subscription_ref.as_deref(), Some(sub.as_str()));
        assert_eq!(details.metadata.get("account_id").unwrap(), "acc_1");
    }

    #[tokio::test]
    async fn mock_unknown_session_is_an_authority_error() {
        let client = MockBillingClient::new();
        let err = client.get_checkout_session("cs_nope").await.unwrap_err();
        assert!(matches!(err, crate::error::AppError::ExternalAuthority(_)));
    }
}
