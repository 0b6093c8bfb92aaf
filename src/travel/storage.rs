//! Storage for travel plans and join requests.
//!
//! The store is the only synchronization point in the workflow, so its
//! mutating operations are intention-revealing and atomic: the guards
//! are evaluated together with the write, never as a separate
//! read-then-write pair in the caller. Two approvals racing for the
//! last seat must serialize here.

use async_trait::async_trait;

use super::error::TravelError;
use super::types::{
    JoinRequest, JoinRequestStatus, RequestDecision, TravelPlan, TravelPlanStatus,
};
use crate::error::Result;

/// A page of results plus the total count.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

#[async_trait]
pub trait TravelStore: Send + Sync {
    /// Insert a plan. When `owned_plan_quota` is `Some(n)`, the count of
    /// the owner's non-deleted plans and the insert happen in one atomic
    /// unit; reaching the quota fails with `PlanQuotaExceeded` and
    /// inserts nothing. `None` means no quota applies (premium or
    /// admin).
    async fn create_plan(&self, plan: &TravelPlan, owned_plan_quota: Option<u32>) -> Result<()>;

    /// A plan by id, including deleted ones. Callers filter.
    async fn find_plan(&self, plan_id: &str) -> Result<Option<TravelPlan>>;

    /// Non-deleted OPEN plans, newest first.
    async fn list_open_plans(&self, offset: u64, limit: u64) -> Result<Page<TravelPlan>>;

    /// The owner's non-deleted plans, newest first.
    async fn list_plans_by_owner(&self, owner_id: &str) -> Result<Vec<TravelPlan>>;

    /// Count of the owner's non-deleted plans.
    async fn count_owned_plans(&self, owner_id: &str) -> Result<u64>;

    /// Update a plan's status. Fails with `PlanNotFound` unless the plan
    /// exists, is not deleted, and belongs to `owner_id`.
    async fn set_plan_status(
        &self,
        plan_id: &str,
        owner_id: &str,
        status: TravelPlanStatus,
    ) -> Result<TravelPlan>;

    /// Soft-delete a plan, same ownership rule as `set_plan_status`.
    async fn soft_delete_plan(&self, plan_id: &str, owner_id: &str) -> Result<()>;

    /// Count of APPROVED requests for a plan.
    async fn count_approved(&self, plan_id: &str) -> Result<u64>;

    /// Insert a join request, atomically enforcing the creation guards:
    /// the plan exists, is not deleted and is OPEN; the requester is not
    /// the owner; no request exists for this `(plan, requester)` pair;
    /// and the APPROVED count is strictly below `max_occupants`. The
    /// capacity check here is the fast-fail; approval re-checks it.
    async fn create_join_request(&self, request: &JoinRequest) -> Result<JoinRequest>;

    async fn find_request(&self, request_id: &str) -> Result<Option<JoinRequest>>;

    /// All requests sent by an account, newest first.
    async fn requests_by_requester(&self, requester_id: &str) -> Result<Vec<JoinRequest>>;

    /// PENDING requests across all of an owner's plans, newest first,
    /// paired with the plan they target.
    async fn pending_requests_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<(JoinRequest, TravelPlan)>>;

    /// Resolve a PENDING request, atomically enforcing the transition
    /// guards: the request exists; `owner_id` owns the targeted plan;
    /// the request is still PENDING (resolved requests fail with
    /// `AlreadyResolved`); and an approval re-validates
    /// `approved_count < max_occupants` in the same atomic unit, failing
    /// with `PlanFull` and leaving the request PENDING.
    async fn resolve_request(
        &self,
        request_id: &str,
        owner_id: &str,
        decision: RequestDecision,
    ) -> Result<JoinRequest>;
}

/// In-memory travel store.
///
/// One mutex over all tables makes every operation a transaction.
/// Suitable for development and tests; production uses the SeaORM store.
#[derive(Default, Clone)]
pub struct InMemoryTravelStore {
    inner: std::sync::Arc<std::sync::Mutex<InMemoryTravelInner>>,
}

#[derive(Default)]
struct InMemoryTravelInner {
    plans: std::collections::HashMap<String, TravelPlan>,
    requests: std::collections::HashMap<String, JoinRequest>,
}

impl InMemoryTravelInner {
    fn approved_count(&self, plan_id: &str) -> u64 {
        self.requests
            .values()
            .filter(|r| r.plan_id == plan_id && r.status == JoinRequestStatus::Approved)
            .count() as u64
    }

    fn owned_count(&self, owner_id: &str) -> u64 {
        self.plans
            .values()
            .filter(|p| p.owner_id == owner_id && !p.is_deleted)
            .count() as u64
    }
}

impl InMemoryTravelStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TravelStore for InMemoryTravelStore {
    async fn create_plan(&self, plan: &TravelPlan, owned_plan_quota: Option<u32>) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(quota) = owned_plan_quota {
            if inner.owned_count(&plan.owner_id) >= u64::from(quota) {
                return Err(TravelError::PlanQuotaExceeded { limit: quota }.into());
            }
        }
        inner.plans.insert(plan.id.clone(), plan.clone());
        Ok(())
    }

    async fn find_plan(&self, plan_id: &str) -> Result<Option<TravelPlan>> {
        Ok(self.inner.lock().unwrap().plans.get(plan_id).cloned())
    }

    async fn list_open_plans(&self, offset: u64, limit: u64) -> Result<Page<TravelPlan>> {
        let inner = self.inner.lock().unwrap();
        let mut open: Vec<TravelPlan> = inner
            .plans
            .values()
            .filter(|p| !p.is_deleted && p.status == TravelPlanStatus::Open)
            .cloned()
            .collect();
        open.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let total = open.len() as u64;
        let items = open
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(Page { items, total })
    }

    async fn list_plans_by_owner(&self, owner_id: &str) -> Result<Vec<TravelPlan>> {
        let inner = self.inner.lock().unwrap();
        let mut owned: Vec<TravelPlan> = inner
            .plans
            .values()
            .filter(|p| p.owner_id == owner_id && !p.is_deleted)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(owned)
    }

    async fn count_owned_plans(&self, owner_id: &str) -> Result<u64> {
        Ok(self.inner.lock().unwrap().owned_count(owner_id))
    }

    async fn set_plan_status(
        &self,
        plan_id: &str,
        owner_id: &str,
        status: TravelPlanStatus,
    ) -> Result<TravelPlan> {
        let mut inner = self.inner.lock().unwrap();
        let plan = inner
            .plans
            .get_mut(plan_id)
            .filter(|p| !p.is_deleted && p.owner_id == owner_id)
            .ok_or(TravelError::PlanNotFound {
                plan_id: plan_id.to_string(),
            })?;
        plan.status = status;
        Ok(plan.clone())
    }

    async fn soft_delete_plan(&self, plan_id: &str, owner_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        let plan = inner
            .plans
            .get_mut(plan_id)
            .filter(|p| !p.is_deleted && p.owner_id == owner_id)
            .ok_or(TravelError::PlanNotFound {
                plan_id: plan_id.to_string(),
            })?;
        plan.is_deleted = true;
        Ok(())
    }

    async fn count_approved(&self, plan_id: &str) -> Result<u64> {
        Ok(self.inner.lock().unwrap().approved_count(plan_id))
    }

    async fn create_join_request(&self, request: &JoinRequest) -> Result<JoinRequest> {
        let mut inner = self.inner.lock().unwrap();

        let plan = inner
            .plans
            .get(&request.plan_id)
            .filter(|p| !p.is_deleted)
            .ok_or(TravelError::PlanNotFound {
                plan_id: request.plan_id.clone(),
            })?
            .clone();

        if plan.status != TravelPlanStatus::Open {
            return Err(TravelError::PlanNotOpen { plan_id: plan.id }.into());
        }
        if plan.owner_id == request.requester_id {
            return Err(TravelError::OwnPlanJoin { plan_id: plan.id }.into());
        }
        let duplicate = inner
            .requests
            .values()
            .any(|r| r.plan_id == request.plan_id && r.requester_id == request.requester_id);
        if duplicate {
            return Err(TravelError::DuplicateRequest { plan_id: plan.id }.into());
        }
        if inner.approved_count(&plan.id) >= u64::from(plan.max_occupants) {
            return Err(TravelError::PlanFull {
                plan_id: plan.id,
                max_occupants: plan.max_occupants,
            }
            .into());
        }

        inner
            .requests
            .insert(request.id.clone(), request.clone());
        Ok(request.clone())
    }

    async fn find_request(&self, request_id: &str) -> Result<Option<JoinRequest>> {
        Ok(self.inner.lock().unwrap().requests.get(request_id).cloned())
    }

    async fn requests_by_requester(&self, requester_id: &str) -> Result<Vec<JoinRequest>> {
        let inner = self.inner.lock().unwrap();
        let mut sent: Vec<JoinRequest> = inner
            .requests
            .values()
            .filter(|r| r.requester_id == requester_id)
            .cloned()
            .collect();
        sent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sent)
    }

    async fn pending_requests_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<(JoinRequest, TravelPlan)>> {
        let inner = self.inner.lock().unwrap();
        let mut pending: Vec<(JoinRequest, TravelPlan)> = inner
            .requests
            .values()
            .filter(|r| r.status == JoinRequestStatus::Pending)
            .filter_map(|r| {
                inner
                    .plans
                    .get(&r.plan_id)
                    .filter(|p| p.owner_id == owner_id && !p.is_deleted)
                    .map(|p| (r.clone(), p.clone()))
            })
            .collect();
        pending.sort_by(|a, b| b.0.created_at.cmp(&a.0.created_at));
        Ok(pending)
    }

    async fn resolve_request(
        &self,
        request_id: &str,
        owner_id: &str,
        decision: RequestDecision,
    ) -> Result<JoinRequest> {
        let mut inner = self.inner.lock().unwrap();

        let request = inner
            .requests
            .get(request_id)
            .cloned()
            .ok_or(TravelError::RequestNotFound {
                request_id: request_id.to_string(),
            })?;

        let plan = inner
            .plans
            .get(&request.plan_id)
            .cloned()
            .ok_or(TravelError::PlanNotFound {
                plan_id: request.plan_id.clone(),
            })?;
        if plan.owner_id != owner_id {
            return Err(TravelError::NotPlanOwner { plan_id: plan.id }.into());
        }
        if request.status.is_resolved() {
            return Err(TravelError::AlreadyResolved {
                request_id: request_id.to_string(),
                status: request.status,
            }
            .into());
        }

        // The safety-critical capacity check: the count and the status
        // flip happen under the same lock, so concurrent approvals
        // cannot both squeeze past the ceiling.
        if decision == RequestDecision::Approved
            && inner.approved_count(&plan.id) >= u64::from(plan.max_occupants)
        {
            return Err(TravelError::PlanFull {
                plan_id: plan.id,
                max_occupants: plan.max_occupants,
            }
            .into());
        }

        let request = inner
            .requests
            .get_mut(request_id)
            .ok_or(TravelError::RequestNotFound {
                request_id: request_id.to_string(),
            })?;
        request.status = decision.as_status();
        Ok(request.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn plan(owner_id: &str, max_occupants: u32) -> TravelPlan {
        TravelPlan {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            title: "Annapurna circuit".to_string(),
            destination: "Nepal".to_string(),
            description: String::new(),
            max_occupants,
            status: TravelPlanStatus::Open,
            is_deleted: false,
            created_at: Utc::now(),
        }
    }

    fn request(plan_id: &str, requester_id: &str) -> JoinRequest {
        JoinRequest {
            id: Uuid::new_v4().to_string(),
            plan_id: plan_id.to_string(),
            requester_id: requester_id.to_string(),
            message: None,
            status: JoinRequestStatus::Pending,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn quota_is_enforced_with_the_insert() {
        let store = InMemoryTravelStore::new();
        for _ in 0..3 {
            store.create_plan(&plan("acc_1", 4), Some(3)).await.unwrap();
        }

        let err = store
            .create_plan(&plan("acc_1", 4), Some(3))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AppError::QuotaExceeded(_)));
        assert_eq!(store.count_owned_plans("acc_1").await.unwrap(), 3);

        // No quota applies to premium owners.
        store.create_plan(&plan("acc_1", 4), None).await.unwrap();
        assert_eq!(store.count_owned_plans("acc_1").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn deleted_plans_do_not_count_against_quota() {
        let store = InMemoryTravelStore::new();
        let first = plan("acc_1", 4);
        store.create_plan(&first, Some(3)).await.unwrap();
        store.create_plan(&plan("acc_1", 4), Some(3)).await.unwrap();
        store.create_plan(&plan("acc_1", 4), Some(3)).await.unwrap();

        store.soft_delete_plan(&first.id, "acc_1").await.unwrap();
        assert!(store.create_plan(&plan("acc_1", 4), Some(3)).await.is_ok());
    }

    #[tokio::test]
    async fn request_guards() {
        let store = InMemoryTravelStore::new();
        let p = plan("owner", 2);
        store.create_plan(&p, None).await.unwrap();

        // Owner cannot join their own plan.
        let err = store
            .create_join_request(&request(&p.id, "owner"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AppError::Forbidden(_)));

        // First request goes through, duplicate conflicts.
        store
            .create_join_request(&request(&p.id, "acc_2"))
            .await
            .unwrap();
        let err = store
            .create_join_request(&request(&p.id, "acc_2"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AppError::Conflict(_)));

        // Unknown plan.
        let err = store
            .create_join_request(&request("tp_ghost", "acc_2"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn closed_or_deleted_plans_reject_requests() {
        let store = InMemoryTravelStore::new();
        let p = plan("owner", 2);
        store.create_plan(&p, None).await.unwrap();
        store
            .set_plan_status(&p.id, "owner", TravelPlanStatus::Completed)
            .await
            .unwrap();

        let err = store
            .create_join_request(&request(&p.id, "acc_2"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AppError::BadRequest(_)));

        let p2 = plan("owner", 2);
        store.create_plan(&p2, None).await.unwrap();
        store.soft_delete_plan(&p2.id, "owner").await.unwrap();
        let err = store
            .create_join_request(&request(&p2.id, "acc_2"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn approval_rechecks_capacity() {
        let store = InMemoryTravelStore::new();
        let p = plan("owner", 1);
        store.create_plan(&p, None).await.unwrap();

        let a = store
            .create_join_request(&request(&p.id, "acc_a"))
            .await
            .unwrap();
        let b = store
            .create_join_request(&request(&p.id, "acc_b"))
            .await
            .unwrap();

        let approved = store
            .resolve_request(&a.id, "owner", RequestDecision::Approved)
            .await
            .unwrap();
        assert_eq!(approved.status, JoinRequestStatus::Approved);

        // The second PENDING request was accepted earlier but the cap is
        // re-validated at approval time.
        let err = store
            .resolve_request(&b.id, "owner", RequestDecision::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AppError::QuotaExceeded(_)));
        let b_after = store.find_request(&b.id).await.unwrap().unwrap();
        assert_eq!(b_after.status, JoinRequestStatus::Pending);

        // Rejecting it is still allowed.
        let rejected = store
            .resolve_request(&b.id, "owner", RequestDecision::Rejected)
            .await
            .unwrap();
        assert_eq!(rejected.status, JoinRequestStatus::Rejected);
    }

    #[tokio::test]
    async fn resolved_requests_never_transition_again() {
        let store = InMemoryTravelStore::new();
        let p = plan("owner", 2);
        store.create_plan(&p, None).await.unwrap();
        let r = store
            .create_join_request(&request(&p.id, "acc_a"))
            .await
            .unwrap();

        store
            .resolve_request(&r.id, "owner", RequestDecision::Rejected)
            .await
            .unwrap();
        let err = store
            .resolve_request(&r.id, "owner", RequestDecision::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn only_the_owner_resolves() {
        let store = InMemoryTravelStore::new();
        let p = plan("owner", 2);
        store.create_plan(&p, None).await.unwrap();
        let r = store
            .create_join_request(&request(&p.id, "acc_a"))
            .await
            .unwrap();

        let err = store
            .resolve_request(&r.id, "acc_b", RequestDecision::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn concurrent_approvals_respect_the_ceiling() {
        let store = InMemoryTravelStore::new();
        let p = plan("owner", 2);
        store.create_plan(&p, None).await.unwrap();

        let mut ids = Vec::new();
        for i in 0..8 {
            let r = store
                .create_join_request(&request(&p.id, &format!("acc_{}", i)))
                .await
                .unwrap();
            ids.push(r.id);
        }

        let mut handles = Vec::new();
        for id in ids {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .resolve_request(&id, "owner", RequestDecision::Approved)
                    .await
            }));
        }

        let mut approvals = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                approvals += 1;
            }
        }
        assert_eq!(approvals, 2);
        assert_eq!(store.count_approved(&p.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn full_plan_rejects_new_requests() {
        let store = InMemoryTravelStore::new();
        let p = plan("owner", 1);
        store.create_plan(&p, None).await.unwrap();

        let a = store
            .create_join_request(&request(&p.id, "acc_a"))
            .await
            .unwrap();
        store
            .resolve_request(&a.id, "owner", RequestDecision::Approved)
            .await
            .unwrap();

        let err = store
            .create_join_request(&request(&p.id, "acc_b"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::AppError::QuotaExceeded(_)));
    }

    #[tokio::test]
    async fn listing_and_views() {
        let store = InMemoryTravelStore::new();
        let p1 = plan("owner", 2);
        let mut p2 = plan("owner", 2);
        p2.status = TravelPlanStatus::Completed;
        store.create_plan(&p1, None).await.unwrap();
        store.create_plan(&p2, None).await.unwrap();

        let open = store.list_open_plans(0, 10).await.unwrap();
        assert_eq!(open.total, 1);
        assert_eq!(open.items[0].id, p1.id);

        let r = store
            .create_join_request(&request(&p1.id, "acc_a"))
            .await
            .unwrap();
        assert_eq!(
            store.requests_by_requester("acc_a").await.unwrap().len(),
            1
        );
        let pending = store.pending_requests_for_owner("owner").await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0.id, r.id);

        store
            .resolve_request(&r.id, "owner", RequestDecision::Approved)
            .await
            .unwrap();
        assert!(store
            .pending_requests_for_owner("owner")
            .await
            .unwrap()
            .is_empty());
    }
}
