//! Checkout initiation.
//!
//! Opens a purchase intent with the external authority and hands the
//! client a redirect URL. Entitlement is never granted here; only the
//! reconciler or the confirmation fallback mutate local state, so a
//! failed or abandoned checkout leaves nothing to roll back.

use std::collections::HashMap;
use std::sync::Arc;

use super::client::{
    BillingAuthorityClient, CheckoutSession, CreateCheckoutSessionRequest, CreateCustomerRequest,
};
use super::error::BillingError;
use super::plans::{PlanCatalog, PlanTier};
use super::storage::EntitlementStore;
use crate::accounts::AccountStore;
use crate::error::{AppError, Result};

/// Redirect targets for the hosted checkout flow.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutConfig {
    /// Derive the standard redirect targets from the client base URL.
    #[must_use]
    pub fn from_client_url(client_url: &str) -> Self {
        let base = client_url.trim_end_matches('/');
        Self {
            success_url: format!("{}/subscription/success?session_id={{CHECKOUT_SESSION_ID}}", base),
            cancel_url: format!("{}/subscription/cancelled", base),
        }
    }

    /// Redirect targets must be absolute http(s) URLs.
    pub fn validate(&self) -> Result<()> {
        for target in [&self.success_url, &self.cancel_url] {
            let parsed = url::Url::parse(target)
                .map_err(|e| AppError::internal(format!("Invalid redirect URL '{}': {}", target, e)))?;
            if parsed.scheme() != "https" && parsed.scheme() != "http" {
                return Err(AppError::internal(format!(
                    "Redirect URL '{}' must be http(s)",
                    target
                )));
            }
        }
        Ok(())
    }
}

/// Opens checkout intents with the external authority.
#[derive(Clone)]
pub struct CheckoutInitiator {
    store: Arc<dyn EntitlementStore>,
    accounts: Arc<dyn AccountStore>,
    client: Arc<dyn BillingAuthorityClient>,
    catalog: PlanCatalog,
    config: CheckoutConfig,
}

impl CheckoutInitiator {
    #[must_use]
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        accounts: Arc<dyn AccountStore>,
        client: Arc<dyn BillingAuthorityClient>,
        catalog: PlanCatalog,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            store,
            accounts,
            client,
            catalog,
            config,
        }
    }

    /// Open a checkout intent for `account_id` buying `plan`.
    ///
    /// Rejects with Conflict when the account already holds an active
    /// paid entitlement. Resolves or creates the authority-side customer
    /// and attaches `{account_id, plan}` as correlation metadata so the
    /// eventual notification can be tied back to this purchase.
    pub async fn create_checkout_session(
        &self,
        account_id: &str,
        plan: PlanTier,
    ) -> Result<CheckoutSession> {
        let account = self
            .accounts
            .find(account_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Account not found: {}", account_id)))?;

        if let Some(existing) = self.store.get(account_id).await? {
            if existing.is_active() {
                return Err(BillingError::AlreadySubscribed {
                    account_id: account_id.to_string(),
                }
                .into());
            }
        }

        let customer_ref = match self.store.customer_ref(account_id).await? {
            Some(existing) => existing,
            None => {
                let created = self
                    .client
                    .create_customer(CreateCustomerRequest {
                        email: account.email.clone(),
                        name: Some(account.full_name.clone()),
                        account_id: account_id.to_string(),
                    })
                    .await?;
                self.store.set_customer_ref(account_id, &created).await?;
                created
            }
        };

        let mut metadata = HashMap::new();
        metadata.insert("account_id".to_string(), account_id.to_string());
        metadata.insert("plan".to_string(), plan.as_str().to_string());

        let session = self
            .client
            .create_checkout_session(CreateCheckoutSessionRequest {
                customer_ref,
                price_id: self.catalog.price_for(plan).to_string(),
                success_url: self.config.success_url.clone(),
                cancel_url: self.config.cancel_url.clone(),
                metadata,
            })
            .await?;

        tracing::info!(
            target: "trekmate::billing",
            account_id = %account_id,
            plan = %plan,
            session_id = %session.id,
            "checkout session created"
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{InMemoryAccountStore, Role};
    use crate::billing::client::mock::MockBillingClient;
    use crate::billing::storage::{EntitlementRecord, EntitlementStatus, InMemoryEntitlementStore};
    use chrono::Utc;

    fn initiator() -> (
        CheckoutInitiator,
        InMemoryEntitlementStore,
        InMemoryAccountStore,
        Arc<MockBillingClient>,
    ) {
        let store = InMemoryEntitlementStore::new();
        let accounts = InMemoryAccountStore::new();
        let client = Arc::new(MockBillingClient::new());
        let initiator = CheckoutInitiator::new(
            Arc::new(store.clone()),
            Arc::new(accounts.clone()),
            client.clone(),
            PlanCatalog::new("price_m", "price_y"),
            CheckoutConfig::from_client_url("https://app.example.com/"),
        );
        (initiator, store, accounts, client)
    }

    #[tokio::test]
    async fn opens_session_without_touching_entitlements() {
        let (initiator, store, accounts, _) = initiator();
        accounts.seed("acc_1", Role::User);

        let session = initiator
            .create_checkout_session("acc_1", PlanTier::Monthly)
            .await
            .unwrap();

        assert!(session.url.contains(&session.id));
        assert!(store.is_empty());
        // The customer link is the one permitted side effect.
        assert!(store.customer_ref("acc_1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn reuses_existing_customer_ref() {
        let (initiator, store, accounts, _) = initiator();
        accounts.seed("acc_1", Role::User);
        store.set_customer_ref("acc_1", "cus_existing").await.unwrap();

        initiator
            .create_checkout_session("acc_1", PlanTier::Monthly)
            .await
            .unwrap();

        assert_eq!(
            store.customer_ref("acc_1").await.unwrap().unwrap(),
            "cus_existing"
        );
    }

    #[tokio::test]
    async fn rejects_active_subscriber() {
        let (initiator, store, accounts, _) = initiator();
        accounts.seed("acc_1", Role::User);
        let now = Utc::now();
        store
            .upsert(&EntitlementRecord {
                account_id: "acc_1".to_string(),
                plan: PlanTier::Monthly,
                status: EntitlementStatus::Active,
                customer_ref: "cus_1".to_string(),
                subscription_ref: "sub_1".to_string(),
                start_date: now,
                end_date: PlanTier::Monthly.period_end(now),
            })
            .await
            .unwrap();

        let err = initiator
            .create_checkout_session("acc_1", PlanTier::Yearly)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn expired_subscriber_may_buy_again() {
        let (initiator, store, accounts, _) = initiator();
        accounts.seed("acc_1", Role::User);
        let now = Utc::now();
        store
            .upsert(&EntitlementRecord {
                account_id: "acc_1".to_string(),
                plan: PlanTier::Monthly,
                status: EntitlementStatus::Expired,
                customer_ref: "cus_1".to_string(),
                subscription_ref: "sub_1".to_string(),
                start_date: now,
                end_date: now,
            })
            .await
            .unwrap();

        assert!(initiator
            .create_checkout_session("acc_1", PlanTier::Yearly)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let (initiator, _, _, _) = initiator();
        let err = initiator
            .create_checkout_session("ghost", PlanTier::Monthly)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn redirect_targets_derive_from_client_url() {
        let config = CheckoutConfig::from_client_url("https://app.example.com/");
        assert_eq!(
            config.cancel_url,
            "https://app.example.com/subscription/cancelled"
        );
        assert!(config.success_url.contains("{CHECKOUT_SESSION_ID}"));
        assert!(config.validate().is_ok());
    }
}
