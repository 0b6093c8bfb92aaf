//! Subscription lifecycle: the shared idempotent grant, the
//! client-invoked confirmation fallback, status reads, and cancellation.
//!
//! The grant is deliberately the only code path that creates an active
//! entitlement. The webhook reconciler and the confirmation fallback
//! race for the same purchase; both funnel into
//! [`SubscriptionManager::apply_paid_checkout`], a deterministic upsert
//! keyed by the external subscription reference, so whichever runs last
//! rewrites the row to the same values and the premium badge is set, not
//! toggled.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use super::client::{BillingAuthorityClient, CheckoutSessionDetails};
use super::error::BillingError;
use super::plans::{PlanCatalog, PlanTier, PREMIUM_FEATURES};
use super::storage::{EntitlementRecord, EntitlementStatus, EntitlementStore};
use crate::accounts::AccountStore;
use crate::error::Result;

/// Everything needed to grant an entitlement for a paid purchase.
#[derive(Debug, Clone)]
pub struct PurchaseGrant {
    pub account_id: String,
    pub plan: PlanTier,
    pub customer_ref: String,
    pub subscription_ref: String,
}

impl PurchaseGrant {
    /// Extract a grant from a checkout session's authoritative state.
    ///
    /// Fails when the session is missing the correlation metadata or the
    /// subscription reference; payment status is checked by the caller.
    pub fn from_session(session: &CheckoutSessionDetails) -> Result<Self> {
        let account_id = session
            .metadata
            .get("account_id")
            .cloned()
            .ok_or(BillingError::MissingCorrelationMetadata {
                context: format!("checkout session '{}'", session.id),
                field: "account_id",
            })?;
        let plan_value = session
            .metadata
            .get("plan")
            .cloned()
            .ok_or(BillingError::MissingCorrelationMetadata {
                context: format!("checkout session '{}'", session.id),
                field: "plan",
            })?;
        let plan = PlanTier::parse(&plan_value)?;
        let subscription_ref = session
            .subscription_ref
            .clone()
            .ok_or(BillingError::MissingCorrelationMetadata {
                context: format!("checkout session '{}'", session.id),
                field: "subscription",
            })?;
        let customer_ref = session
            .customer_ref
            .clone()
            .ok_or(BillingError::MissingCorrelationMetadata {
                context: format!("checkout session '{}'", session.id),
                field: "customer",
            })?;
        Ok(Self {
            account_id,
            plan,
            customer_ref,
            subscription_ref,
        })
    }
}

/// Subscription state reported by the status endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusView {
    pub has_subscription: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanTier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EntitlementStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<chrono::DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<chrono::DateTime<Utc>>,
    pub features: Vec<String>,
    /// Present when the account is on the free tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub free_tier_limits: Option<super::plans::FreeTierLimits>,
}

/// Entitlement summary returned by the confirmation endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementView {
    pub plan: PlanTier,
    pub status: EntitlementStatus,
    pub start_date: chrono::DateTime<Utc>,
    pub end_date: chrono::DateTime<Utc>,
}

impl From<EntitlementRecord> for EntitlementView {
    fn from(record: EntitlementRecord) -> Self {
        Self {
            plan: record.plan,
            status: record.status,
            start_date: record.start_date,
            end_date: record.end_date,
        }
    }
}

/// Subscription lifecycle operations.
#[derive(Clone)]
pub struct SubscriptionManager {
    store: Arc<dyn EntitlementStore>,
    accounts: Arc<dyn AccountStore>,
    client: Arc<dyn BillingAuthorityClient>,
    catalog: PlanCatalog,
}

impl SubscriptionManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        accounts: Arc<dyn AccountStore>,
        client: Arc<dyn BillingAuthorityClient>,
        catalog: PlanCatalog,
    ) -> Self {
        Self {
            store,
            accounts,
            client,
            catalog,
        }
    }

    /// Grant (or re-grant) the entitlement for a paid purchase.
    ///
    /// Idempotent: the row is upserted whole, keyed by the stable
    /// external subscription reference, and the badge is set to an
    /// absolute value. Applying the same grant twice leaves identical
    /// state.
    pub async fn apply_paid_checkout(&self, grant: PurchaseGrant) -> Result<EntitlementRecord> {
        // If this exact purchase was already applied, keep the original
        // validity window instead of restarting it on every replay.
        let record = match self
            .store
            .get_by_subscription_ref(&grant.subscription_ref)
            .await?
        {
            Some(existing) if existing.account_id == grant.account_id => EntitlementRecord {
                plan: grant.plan,
                status: EntitlementStatus::Active,
                customer_ref: grant.customer_ref.clone(),
                ..existing
            },
            _ => {
                let start = Utc::now();
                EntitlementRecord {
                    account_id: grant.account_id.clone(),
                    plan: grant.plan,
                    status: EntitlementStatus::Active,
                    customer_ref: grant.customer_ref.clone(),
                    subscription_ref: grant.subscription_ref.clone(),
                    start_date: start,
                    end_date: grant.plan.period_end(start),
                }
            }
        };

        self.store.upsert(&record).await?;
        self.store
            .set_customer_ref(&record.account_id, &record.customer_ref)
            .await?;

        if !self
            .accounts
            .set_premium_badge(&record.account_id, true)
            .await?
        {
            tracing::warn!(
                target: "trekmate::billing",
                account_id = %record.account_id,
                "granted entitlement for unknown account"
            );
        }

        tracing::info!(
            target: "trekmate::billing",
            account_id = %record.account_id,
            plan = %record.plan,
            subscription_ref = %record.subscription_ref,
            "entitlement granted"
        );
        Ok(record)
    }

    /// Confirmation fallback for clients returning from checkout before
    /// the webhook arrives.
    ///
    /// Re-fetches the authoritative session state, verifies the payment
    /// went through and that the session belongs to the caller, then
    /// applies the same grant the webhook path would.
    pub async fn confirm_checkout(
        &self,
        account_id: &str,
        session_id: &str,
    ) -> Result<EntitlementRecord> {
        let session = self.client.get_checkout_session(session_id).await?;

        match session.metadata.get("account_id") {
            Some(owner) if owner == account_id => {}
            _ => {
                return Err(BillingError::SessionOwnershipMismatch {
                    session_id: session_id.to_string(),
                }
                .into());
            }
        }

        if session.payment_status != "paid" {
            return Err(BillingError::SessionNotPaid {
                session_id: session_id.to_string(),
                payment_status: session.payment_status.clone(),
            }
            .into());
        }

        let grant = PurchaseGrant::from_session(&session)?;
        self.apply_paid_checkout(grant).await
    }

    /// Current subscription state for an account. No external call.
    pub async fn status(&self, account_id: &str) -> Result<SubscriptionStatusView> {
        match self.store.get(account_id).await? {
            Some(record) if record.is_active() => Ok(SubscriptionStatusView {
                has_subscription: true,
                plan: Some(record.plan),
                status: Some(record.status),
                start_date: Some(record.start_date),
                end_date: Some(record.end_date),
                features: PREMIUM_FEATURES.iter().map(|f| f.to_string()).collect(),
                free_tier_limits: None,
            }),
            Some(record) => Ok(SubscriptionStatusView {
                has_subscription: true,
                plan: Some(record.plan),
                status: Some(record.status),
                start_date: Some(record.start_date),
                end_date: Some(record.end_date),
                features: Vec::new(),
                free_tier_limits: Some(self.catalog.free_limits),
            }),
            None => Ok(SubscriptionStatusView {
                has_subscription: false,
                plan: None,
                status: None,
                start_date: None,
                end_date: None,
                features: Vec::new(),
                free_tier_limits: Some(self.catalog.free_limits),
            }),
        }
    }

    /// Cancel with the authority and revert the account to FREE.
    pub async fn cancel(&self, account_id: &str) -> Result<()> {
        let record = self.store.get(account_id).await?.ok_or({
            BillingError::NoSubscription {
                account_id: account_id.to_string(),
            }
        })?;

        self.client
            .cancel_subscription(&record.subscription_ref)
            .await?;

        self.store
            .delete_by_subscription_ref(&record.subscription_ref)
            .await?;
        self.accounts.set_premium_badge(account_id, false).await?;

        tracing::info!(
            target: "trekmate::billing",
            account_id = %account_id,
            subscription_ref = %record.subscription_ref,
            "subscription cancelled"
        );
        Ok(())
    }
}
