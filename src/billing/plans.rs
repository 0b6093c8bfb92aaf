//! Paid plan tiers and free-tier limits.
//!
//! The FREE tier is never materialized: an account is on it exactly when
//! no entitlement row exists (or the row has expired).

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A paid plan tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanTier {
    Monthly,
    Yearly,
}

impl PlanTier {
    /// Parse the wire name used by the API and in checkout metadata.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "MONTHLY" => Ok(Self::Monthly),
            "YEARLY" => Ok(Self::Yearly),
            other => Err(AppError::bad_request(format!(
                "Unknown plan: {}. Expected MONTHLY or YEARLY",
                other
            ))),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Monthly => "MONTHLY",
            Self::Yearly => "YEARLY",
        }
    }

    /// End of the billing period that starts at `start`.
    ///
    /// One calendar month for MONTHLY, one calendar year for YEARLY.
    #[must_use]
    pub fn period_end(&self, start: DateTime<Utc>) -> DateTime<Utc> {
        let months = match self {
            Self::Monthly => 1,
            Self::Yearly => 12,
        };
        start
            .checked_add_months(Months::new(months))
            .unwrap_or(start)
    }
}

impl std::fmt::Display for PlanTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Limits that apply to accounts without an active paid entitlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreeTierLimits {
    /// Maximum number of non-deleted travel plans a free account may own.
    pub max_travel_plans: u32,
}

impl Default for FreeTierLimits {
    fn default() -> Self {
        Self {
            max_travel_plans: 3,
        }
    }
}

/// Catalog mapping plan tiers to the external authority's price ids and
/// describing what a paid subscription unlocks.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    pub monthly_price_id: String,
    pub yearly_price_id: String,
    pub free_limits: FreeTierLimits,
}

/// Features every paid tier unlocks, reported by the status endpoint.
pub const PREMIUM_FEATURES: &[&str] = &[
    "unlimited_travel_plans",
    "premium_badge",
    "priority_matching",
];

impl PlanCatalog {
    #[must_use]
    pub fn new(monthly_price_id: impl Into<String>, yearly_price_id: impl Into<String>) -> Self {
        Self {
            monthly_price_id: monthly_price_id.into(),
            yearly_price_id: yearly_price_id.into(),
            free_limits: FreeTierLimits::default(),
        }
    }

    #[must_use]
    pub fn with_free_limits(mut self, limits: FreeTierLimits) -> Self {
        self.free_limits = limits;
        self
    }

    /// External price id for a tier.
    #[must_use]
    pub fn price_for(&self, tier: PlanTier) -> &str {
        match tier {
            PlanTier::Monthly => &self.monthly_price_id,
            PlanTier::Yearly => &self.yearly_price_id,
        }
    }

    /// Reverse lookup used when reconciling authority payloads.
    #[must_use]
    pub fn tier_for_price(&self, price_id: &str) -> Option<PlanTier> {
        if price_id == self.monthly_price_id {
            Some(PlanTier::Monthly)
        } else if price_id == self.yearly_price_id {
            Some(PlanTier::Yearly)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_wire_names() {
        assert_eq!(PlanTier::parse("MONTHLY").unwrap(), PlanTier::Monthly);
        assert_eq!(PlanTier::parse("YEARLY").unwrap(), PlanTier::Yearly);
        assert!(PlanTier::parse("WEEKLY").is_err());
        assert!(PlanTier::parse("monthly").is_err());
    }

    #[test]
    fn period_end_adds_one_billing_period() {
        let start = Utc.with_ymd_and_hms(2024, 3, 15, 12, 0, 0).unwrap();

        let monthly_end = PlanTier::Monthly.period_end(start);
        assert_eq!(
            monthly_end,
            Utc.with_ymd_and_hms(2024, 4, 15, 12, 0, 0).unwrap()
        );

        let yearly_end = PlanTier::Yearly.period_end(start);
        assert_eq!(
            yearly_end,
            Utc.with_ymd_and_hms(2025, 3, 15, 12, 0, 0).unwrap()
        );
    }

    #[test]
    fn period_end_clamps_month_boundaries() {
        // Jan 31 + 1 month lands on Feb 29 in a leap year.
        let start = Utc.with_ymd_and_hms(2024, 1, 31, 0, 0, 0).unwrap();
        let end = PlanTier::Monthly.period_end(start);
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap());
    }

    #[test]
    fn catalog_price_lookup_round_trips() {
        let catalog = PlanCatalog::new("price_m", "price_y");
        assert_eq!(catalog.price_for(PlanTier::Monthly), "price_m");
        assert_eq!(catalog.tier_for_price("price_y"), Some(PlanTier::Yearly));
        assert_eq!(catalog.tier_for_price("price_unknown"), None);
    }
}
