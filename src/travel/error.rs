//! Travel workflow error types.

use std::fmt;

use super::types::JoinRequestStatus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TravelError {
    PlanNotFound { plan_id: String },
    RequestNotFound { request_id: String },
    /// The plan is not accepting requests (completed or cancelled).
    PlanNotOpen { plan_id: String },
    /// The requester owns the plan.
    OwnPlanJoin { plan_id: String },
    /// APPROVED occupancy has reached the ceiling.
    PlanFull { plan_id: String, max_occupants: u32 },
    /// A request for this `(plan, requester)` pair already exists.
    DuplicateRequest { plan_id: String },
    /// Only the plan owner may act on this resource.
    NotPlanOwner { plan_id: String },
    /// The request was already resolved; terminal states never
    /// transition again.
    AlreadyResolved {
        request_id: String,
        status: JoinRequestStatus,
    },
    /// Free-tier listing quota reached.
    PlanQuotaExceeded { limit: u32 },
}

impl fmt::Display for TravelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PlanNotFound { plan_id } => write!(f, "Travel plan not found: {}", plan_id),
            Self::RequestNotFound { request_id } => {
                write!(f, "Travel request not found: {}", request_id)
            }
            Self::PlanNotOpen { plan_id } => {
                write!(f, "Travel plan '{}' is not accepting requests", plan_id)
            }
            Self::OwnPlanJoin { plan_id } => {
                write!(f, "You cannot request to join your own travel plan '{}'", plan_id)
            }
            Self::PlanFull {
                plan_id,
                max_occupants,
            } => write!(
                f,
                "Travel plan '{}' is full ({} members maximum)",
                plan_id, max_occupants
            ),
            Self::DuplicateRequest { plan_id } => {
                write!(f, "You already sent a request for travel plan '{}'", plan_id)
            }
            Self::NotPlanOwner { plan_id } => write!(
                f,
                "Only the owner of travel plan '{}' may respond to its requests",
                plan_id
            ),
            Self::AlreadyResolved { request_id, status } => write!(
                f,
                "Travel request '{}' was already resolved as {}",
                request_id, status
            ),
            Self::PlanQuotaExceeded { limit } => write!(
                f,
                "Free plan allows only {} travel plans. Upgrade to premium for unlimited plans",
                limit
            ),
        }
    }
}

impl std::error::Error for TravelError {}

impl From<TravelError> for crate::error::AppError {
    fn from(err: TravelError) -> Self {
        use crate::error::AppError;
        match &err {
            TravelError::PlanNotFound { .. } | TravelError::RequestNotFound { .. } => {
                AppError::NotFound(err.to_string())
            }
            TravelError::PlanNotOpen { .. } => AppError::BadRequest(err.to_string()),
            TravelError::OwnPlanJoin { .. } | TravelError::NotPlanOwner { .. } => {
                AppError::Forbidden(err.to_string())
            }
            TravelError::DuplicateRequest { .. } | TravelError::AlreadyResolved { .. } => {
                AppError::Conflict(err.to_string())
            }
            TravelError::PlanFull { .. } | TravelError::PlanQuotaExceeded { .. } => {
                AppError::QuotaExceeded(err.to_string())
            }
        }
    }
}
