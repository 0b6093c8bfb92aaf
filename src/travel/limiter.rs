//! Free-tier listing quota.
//!
//! A pure read against the entitlement store decides whether the quota
//! applies; the store enforces it atomically with the insert.

use std::sync::Arc;

use crate::accounts::{Account, Role};
use crate::billing::plans::FreeTierLimits;
use crate::billing::storage::EntitlementStore;
use crate::error::Result;

#[derive(Clone)]
pub struct PlanLimiter {
    entitlements: Arc<dyn EntitlementStore>,
    limits: FreeTierLimits,
}

impl PlanLimiter {
    #[must_use]
    pub fn new(entitlements: Arc<dyn EntitlementStore>, limits: FreeTierLimits) -> Self {
        Self {
            entitlements,
            limits,
        }
    }

    /// Whether the account currently holds an active paid entitlement.
    /// No external call; the local record is authoritative for gating.
    pub async fn has_premium(&self, account_id: &str) -> Result<bool> {
        Ok(self
            .entitlements
            .get(account_id)
            .await?
            .is_some_and(|record| record.is_active()))
    }

    /// The listing quota to enforce for this account, if any.
    ///
    /// Administrators bypass the limiter entirely; premium accounts are
    /// unlimited; everyone else gets the free-tier cap.
    pub async fn listing_quota(&self, account: &Account) -> Result<Option<u32>> {
        if account.role == Role::Admin {
            return Ok(None);
        }
        if self.has_premium(&account.id).await? {
            return Ok(None);
        }
        Ok(Some(self.limits.max_travel_plans))
    }
}
