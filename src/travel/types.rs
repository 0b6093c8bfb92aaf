//! Travel plan and join request types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A travel plan listing.
///
/// Owned exclusively by its creator for mutation; publicly readable
/// while OPEN and not deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TravelPlan {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub destination: String,
    pub description: String,
    /// Hard ceiling on APPROVED join requests. The creator occupies a
    /// slot of their own outside this count.
    pub max_occupants: u32,
    pub status: TravelPlanStatus,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TravelPlanStatus {
    Open,
    Completed,
    Cancelled,
}

impl TravelPlanStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "OPEN" => Some(Self::Open),
            "COMPLETED" => Some(Self::Completed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for TravelPlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A join request for a travel plan.
///
/// At most one per `(plan, requester)` pair. Transitions exactly once:
/// PENDING to APPROVED or PENDING to REJECTED, both terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    pub id: String,
    pub plan_id: String,
    pub requester_id: String,
    pub message: Option<String>,
    pub status: JoinRequestStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JoinRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl JoinRequestStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for JoinRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Owner's verdict on a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestDecision {
    Approved,
    Rejected,
}

impl RequestDecision {
    #[must_use]
    pub fn as_status(&self) -> JoinRequestStatus {
        match self {
            Self::Approved => JoinRequestStatus::Approved,
            Self::Rejected => JoinRequestStatus::Rejected,
        }
    }
}

/// Input for creating a travel plan.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTravelPlan {
    pub title: String,
    pub destination: String,
    #[serde(default)]
    pub description: String,
    pub max_occupants: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_status_parse_round_trip() {
        for status in [
            TravelPlanStatus::Open,
            TravelPlanStatus::Completed,
            TravelPlanStatus::Cancelled,
        ] {
            assert_eq!(TravelPlanStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TravelPlanStatus::parse("open"), None);
    }

    #[test]
    fn resolved_statuses() {
        assert!(!JoinRequestStatus::Pending.is_resolved());
        assert!(JoinRequestStatus::Approved.is_resolved());
        assert!(JoinRequestStatus::Rejected.is_resolved());
    }
}
