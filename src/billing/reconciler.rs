//! The event reconciler.
//!
//! Consumes verified lifecycle notifications from the billing authority
//! and applies idempotent transitions to the entitlement store. Events
//! arrive at-least-once and in arrival order, not causal order: an
//! update may land before the purchase that created the row, and any
//! event may be delivered twice. Every transition here is therefore an
//! upsert or a conditional update keyed by a stable external reference,
//! and an unmatched reference is a no-op rather than an error.

use serde_json::Value;
use std::sync::Arc;

use super::client::{BillingAuthorityClient, CheckoutSessionDetails};
use super::error::BillingError;
use super::storage::{EntitlementStatus, EntitlementStore};
use super::subscription::{PurchaseGrant, SubscriptionManager};
use super::webhook::WebhookEvent;
use crate::accounts::AccountStore;
use crate::error::Result;

/// What a delivered event did to local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A transition was applied (possibly redundantly).
    Applied,
    /// The event was valid but matched no local state.
    NoOp,
    /// The event type is not one we handle.
    Ignored,
}

/// Applies lifecycle notifications to the entitlement store.
#[derive(Clone)]
pub struct EventReconciler {
    subscriptions: SubscriptionManager,
    store: Arc<dyn EntitlementStore>,
    accounts: Arc<dyn AccountStore>,
    client: Arc<dyn BillingAuthorityClient>,
}

impl EventReconciler {
    #[must_use]
    pub fn new(
        subscriptions: SubscriptionManager,
        store: Arc<dyn EntitlementStore>,
        accounts: Arc<dyn AccountStore>,
        client: Arc<dyn BillingAuthorityClient>,
    ) -> Self {
        Self {
            subscriptions,
            store,
            accounts,
            client,
        }
    }

    /// Dispatch one verified event.
    pub async fn handle_event(&self, event: &WebhookEvent) -> Result<ReconcileOutcome> {
        let outcome = match event.event_type.as_str() {
            "checkout.session.completed" => self.purchase_completed(&event.data.object).await?,
            "customer.subscription.created" | "customer.subscription.updated" => {
                self.subscription_updated(&event.data.object).await?
            }
            "customer.subscription.deleted" => {
                self.subscription_cancelled(&event.data.object).await?
            }
            "invoice.payment_failed" => self.payment_failed(&event.data.object).await?,
            other => {
                tracing::info!(
                    target: "trekmate::billing::reconciler",
                    event_id = %event.id,
                    event_type = %other,
                    "ignoring unhandled event type"
                );
                ReconcileOutcome::Ignored
            }
        };
        Ok(outcome)
    }

    /// Purchase completed: upsert the entitlement keyed by the
    /// subscription reference carried on the checkout intent.
    async fn purchase_completed(&self, object: &Value) -> Result<ReconcileOutcome> {
        let session_id = require_str(object, "id", "checkout session payload")?;

        // Asynchronous payment methods complete the session before the
        // payment settles; those sessions come back through a later
        // event once paid.
        if let Some(status) = object.get("payment_status").and_then(Value::as_str) {
            if status != "paid" {
                tracing::info!(
                    target: "trekmate::billing::reconciler",
                    session_id = %session_id,
                    payment_status = %status,
                    "checkout completed but not paid yet"
                );
                return Ok(ReconcileOutcome::NoOp);
            }
        }

        let details = match session_from_payload(session_id, object) {
            Some(details) => details,
            // The payload did not carry everything the grant needs
            // (thin event configuration); fetch the authoritative state.
            None => self.client.get_checkout_session(session_id).await?,
        };

        let grant = PurchaseGrant::from_session(&details)?;
        self.subscriptions.apply_paid_checkout(grant).await?;
        Ok(ReconcileOutcome::Applied)
    }

    /// Subscription updated: map the authority's status onto ours for
    /// the matching row. No matching row means the purchase notification
    /// has not arrived yet; the event is dropped, not retried, because
    /// the grant carries the current status anyway.
    async fn subscription_updated(&self, object: &Value) -> Result<ReconcileOutcome> {
        let subscription_ref = require_str(object, "id", "subscription payload")?;
        let status_raw = object
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or("active");
        let status = EntitlementStatus::from_authority(status_raw);

        match self
            .store
            .set_status_by_subscription_ref(subscription_ref, status)
            .await?
        {
            Some(record) => {
                self.accounts
                    .set_premium_badge(&record.account_id, record.is_active())
                    .await?;
                tracing::info!(
                    target: "trekmate::billing::reconciler",
                    subscription_ref = %subscription_ref,
                    status = %status,
                    "entitlement status updated"
                );
                Ok(ReconcileOutcome::Applied)
            }
            None => {
                tracing::debug!(
                    target: "trekmate::billing::reconciler",
                    subscription_ref = %subscription_ref,
                    "update for unknown subscription, no-op"
                );
                Ok(ReconcileOutcome::NoOp)
            }
        }
    }

    /// Subscription cancelled: delete the row, reverting the account to
    /// the implicit FREE tier.
    async fn subscription_cancelled(&self, object: &Value) -> Result<ReconcileOutcome> {
        let subscription_ref = require_str(object, "id", "subscription payload")?;

        match self
            .store
            .delete_by_subscription_ref(subscription_ref)
            .await?
        {
            Some(record) => {
                self.accounts
                    .set_premium_badge(&record.account_id, false)
                    .await?;
                tracing::info!(
                    target: "trekmate::billing::reconciler",
                    account_id = %record.account_id,
                    subscription_ref = %subscription_ref,
                    "entitlement removed on cancellation"
                );
                Ok(ReconcileOutcome::Applied)
            }
            None => Ok(ReconcileOutcome::NoOp),
        }
    }

    /// Payment failed: mark the row expired but keep it, so a lapsed
    /// subscriber stays distinguishable from one who never subscribed.
    async fn payment_failed(&self, object: &Value) -> Result<ReconcileOutcome> {
        let subscription_ref = require_str(object, "subscription", "invoice payload")?;

        match self
            .store
            .set_status_by_subscription_ref(subscription_ref, EntitlementStatus::Expired)
            .await?
        {
            Some(record) => {
                self.accounts
                    .set_premium_badge(&record.account_id, false)
                    .await?;
                tracing::warn!(
                    target: "trekmate::billing::reconciler",
                    account_id = %record.account_id,
                    subscription_ref = %subscription_ref,
                    "entitlement expired after failed payment"
                );
                Ok(ReconcileOutcome::Applied)
            }
            None => Ok(ReconcileOutcome::NoOp),
        }
    }
}

fn require_str<'a>(object: &'a Value, field: &'static str, context: &str) -> Result<&'a str> {
    object
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| {
            BillingError::InvalidWebhookPayload {
                message: format!("missing '{}' in {}", field, context),
            }
            .into()
        })
}

/// Build session details straight from the event payload when it carries
/// everything the grant needs; otherwise the caller re-fetches.
fn session_from_payload(session_id: &str, object: &Value) -> Option<CheckoutSessionDetails> {
    let subscription_ref = object.get("subscription")?.as_str()?.to_string();
    let customer_ref = object.get("customer")?.as_str()?.to_string();
    let metadata = object.get("metadata")?.as_object()?;
    let metadata = metadata
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
        .collect();
    Some(CheckoutSessionDetails {
        id: session_id.to_string(),
        payment_status: object
            .get("payment_status")
            .and_then(Value::as_str)
            .unwrap_or("paid")
            .to_string(),
        customer_ref: Some(customer_ref),
        subscription_ref: Some(subscription_ref),
        metadata,
    })
}
