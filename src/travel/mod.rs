//! Travel plans and the capacity-constrained join request workflow.
//!
//! A plan has a fixed maximum occupancy; join requests move
//! PENDING -> APPROVED or PENDING -> REJECTED exactly once. Uniqueness
//! (one request per account per plan) and the occupancy ceiling hold
//! under concurrent access because [`storage::TravelStore`] evaluates
//! every guard atomically with its write.

pub mod error;
pub mod limiter;
pub mod requests;
pub mod storage;
pub mod types;

#[cfg(feature = "database")]
pub mod sea_orm_store;

pub use error::TravelError;
pub use limiter::PlanLimiter;
pub use requests::TravelRequestManager;
pub use storage::{InMemoryTravelStore, Page, TravelStore};
pub use types::{
    JoinRequest, JoinRequestStatus, NewTravelPlan, RequestDecision, TravelPlan, TravelPlanStatus,
};

#[cfg(feature = "database")]
pub use sea_orm_store::SeaOrmTravelStore;
