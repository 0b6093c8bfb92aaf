//! Storage for entitlement records.
//!
//! One row per account, keyed by `account_id`; the external
//! `subscription_ref` is the stable correlation key for reconciliation.
//! Absence of a row means the account is on the FREE tier, which is why
//! every read returns `Option<EntitlementRecord>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::plans::PlanTier;
use crate::error::Result;

/// Local record of a paid entitlement.
///
/// Created and updated only by the event reconciler or the confirmation
/// fallback; deleted on cancellation notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementRecord {
    /// Owning account.
    pub account_id: String,
    pub plan: PlanTier,
    pub status: EntitlementStatus,
    /// Customer reference assigned by the external authority.
    pub customer_ref: String,
    /// Subscription reference assigned by the external authority.
    /// Stable key for idempotent reconciliation.
    pub subscription_ref: String,
    /// Validity window. Advisory only; `status` is authoritative for
    /// access checks.
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

impl EntitlementRecord {
    /// Whether this record currently grants premium access.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == EntitlementStatus::Active
    }
}

/// Entitlement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntitlementStatus {
    Active,
    /// Lapsed but previously subscribed. Distinct from "never
    /// subscribed", which is the absence of a record.
    Expired,
}

impl EntitlementStatus {
    /// Map the external authority's subscription status onto ours.
    /// Only `"active"` grants access; everything else is expired.
    #[must_use]
    pub fn from_authority(status: &str) -> Self {
        match status {
            "active" => Self::Active,
            _ => Self::Expired,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
        }
    }
}

impl std::fmt::Display for EntitlementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trait for persisting entitlement state.
///
/// Implementations must make each method atomic with respect to the
/// others: the upsert and the conditional updates below are the
/// idempotency mechanism for duplicated and racing notifications, so a
/// read-then-write pair is not an acceptable implementation.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Entitlement for an account. `None` means FREE tier.
    async fn get(&self, account_id: &str) -> Result<Option<EntitlementRecord>>;

    /// Entitlement matched by the external subscription reference.
    async fn get_by_subscription_ref(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<EntitlementRecord>>;

    /// Insert or replace the single entitlement row for
    /// `record.account_id` in one atomic step. Replaying the same
    /// record must leave state unchanged.
    async fn upsert(&self, record: &EntitlementRecord) -> Result<()>;

    /// Conditionally set the status of the row matching
    /// `subscription_ref`. Returns the updated record, or `None` when no
    /// row matched (callers treat that as a no-op, not an error).
    async fn set_status_by_subscription_ref(
        &self,
        subscription_ref: &str,
        status: EntitlementStatus,
    ) -> Result<Option<EntitlementRecord>>;

    /// Delete the row matching `subscription_ref`, reverting the account
    /// to the implicit FREE tier. Returns the deleted record, or `None`
    /// when no row matched.
    async fn delete_by_subscription_ref(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<EntitlementRecord>>;

    // Customer linkage, so repeat checkouts reuse the authority-side
    // customer instead of minting a new one.

    /// External customer reference for an account, if one was assigned.
    async fn customer_ref(&self, account_id: &str) -> Result<Option<String>>;

    /// Link an account to an external customer reference.
    async fn set_customer_ref(&self, account_id: &str, customer_ref: &str) -> Result<()>;
}

/// In-memory entitlement store.
///
/// Atomicity comes from holding a single lock across each operation.
/// Suitable for development and tests; production uses the SeaORM store.
#[derive(Default, Clone)]
pub struct InMemoryEntitlementStore {
    inner: std::sync::Arc<std::sync::RwLock<InMemoryEntitlementInner>>,
}

#[derive(Default)]
struct InMemoryEntitlementInner {
    records: std::collections::HashMap<String, EntitlementRecord>,
    customers: std::collections::HashMap<String, String>,
}

impl InMemoryEntitlementStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entitlement rows (for tests).
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().unwrap().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn get(&self, account_id: &str) -> Result<Option<EntitlementRecord>> {
        Ok(self.inner.read().unwrap().records.get(account_id).cloned())
    }

    async fn get_by_subscription_ref(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<EntitlementRecord>> {
        let inner = self.inner.read().unwrap();
        Ok(inner
            .records
            .values()
            .find(|r| r.subscription_ref == subscription_ref)
            .cloned())
    }

    async fn upsert(&self, record: &EntitlementRecord) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .records
            .insert(record.account_id.clone(), record.clone());
        Ok(())
    }

    async fn set_status_by_subscription_ref(
        &self,
        subscription_ref: &str,
        status: EntitlementStatus,
    ) -> Result<Option<EntitlementRecord>> {
        let mut inner = self.inner.write().unwrap();
        let record = inner
            .records
            .values_mut()
            .find(|r| r.subscription_ref == subscription_ref);
        Ok(record.map(|r| {
            r.status = status;
            r.clone()
        }))
    }

    async fn delete_by_subscription_ref(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<EntitlementRecord>> {
        let mut inner = self.inner.write().unwrap();
        let account_id = inner
            .records
            .values()
            .find(|r| r.subscription_ref == subscription_ref)
            .map(|r| r.account_id.clone());
        Ok(account_id.and_then(|id| inner.records.remove(&id)))
    }

    async fn customer_ref(&self, account_id: &str) -> Result<Option<String>> {
        Ok(self.inner.read().unwrap().customers.get(account_id).cloned())
    }

    async fn set_customer_ref(&self, account_id: &str, customer_ref: &str) -> Result<()> {
        let mut inner = self.inner.write().unwrap();
        inner
            .customers
            .insert(account_id.to_string(), customer_ref.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(account_id: &str, subscription_ref: &str) -> EntitlementRecord {
        let now = Utc::now();
        EntitlementRecord {
            account_id: account_id.to_string(),
            plan: PlanTier::Monthly,
            status: EntitlementStatus::Active,
            customer_ref: "cus_1".to_string(),
            subscription_ref: subscription_ref.to_string(),
            start_date: now,
            end_date: PlanTier::Monthly.period_end(now),
        }
    }

    #[test]
    fn authority_status_mapping() {
        assert_eq!(
            EntitlementStatus::from_authority("active"),
            EntitlementStatus::Active
        );
        for other in ["past_due", "canceled", "unpaid", "trialing", "incomplete"] {
            assert_eq!(
                EntitlementStatus::from_authority(other),
                EntitlementStatus::Expired
            );
        }
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_account() {
        let store = InMemoryEntitlementStore::new();

        store.upsert(&record("acc_1", "sub_a")).await.unwrap();
        let mut replacement = record("acc_1", "sub_b");
        replacement.plan = PlanTier::Yearly;
        store.upsert(&replacement).await.unwrap();

        assert_eq!(store.len(), 1);
        let stored = store.get("acc_1").await.unwrap().unwrap();
        assert_eq!(stored.subscription_ref, "sub_b");
        assert_eq!(stored.plan, PlanTier::Yearly);
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let store = InMemoryEntitlementStore::new();
        let rec = record("acc_1", "sub_a");

        store.upsert(&rec).await.unwrap();
        let first = store.get("acc_1").await.unwrap().unwrap();
        store.upsert(&rec).await.unwrap();
        let second = store.get("acc_1").await.unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn status_update_by_unknown_ref_is_none() {
        let store = InMemoryEntitlementStore::new();
        let updated = store
            .set_status_by_subscription_ref("sub_missing", EntitlementStatus::Expired)
            .await
            .unwrap();
        assert!(updated.is_none());
    }

    #[tokio::test]
    async fn delete_by_ref_reverts_to_free() {
        let store = InMemoryEntitlementStore::new();
        store.upsert(&record("acc_1", "sub_a")).await.unwrap();

        let deleted = store.delete_by_subscription_ref("sub_a").await.unwrap();
        assert_eq!(deleted.unwrap().account_id, "acc_1");
        assert!(store.get("acc_1").await.unwrap().is_none());

        // Second delivery of the same cancellation is a no-op.
        let deleted = store.delete_by_subscription_ref("sub_a").await.unwrap();
        assert!(deleted.is_none());
    }

    #[tokio::test]
    async fn customer_linkage() {
        let store = InMemoryEntitlementStore::new();
        assert!(store.customer_ref("acc_1").await.unwrap().is_none());
        store.set_customer_ref("acc_1", "cus_9").await.unwrap();
        assert_eq!(
            store.customer_ref("acc_1").await.unwrap().unwrap(),
            "cus_9"
        );
    }
}
