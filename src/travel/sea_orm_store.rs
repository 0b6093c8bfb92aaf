//! SeaORM-backed travel storage.
//!
//! The guarded mutations run inside transactions. Approval takes an
//! exclusive lock on the plan row before counting occupancy, so two
//! approvals racing for the last seat serialize at the database; the
//! quota-checked insert serializes per owner through an advisory
//! transaction lock, since there is no plan row to lock yet. The
//! `(plan_id, requester_id)` pair is backed by a unique index and the
//! insert maps its conflict to a typed duplicate error.

use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, Statement, TransactionTrait,
    sea_query::Expr, sea_query::OnConflict,
};

use super::error::TravelError;
use super::storage::{Page, TravelStore};
use super::types::{
    JoinRequest, JoinRequestStatus, RequestDecision, TravelPlan, TravelPlanStatus,
};
use crate::error::{AppError, Result};

// =============================================================================
// Entities
// =============================================================================

mod entity {
    use sea_orm::entity::prelude::*;

    pub mod travel_plan {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "travel_plans")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub owner_id: String,
            pub title: String,
            pub destination: String,
            #[sea_orm(column_type = "Text")]
            pub description: String,
            pub max_occupants: i32,
            pub status: String,
            pub is_deleted: bool,
            pub created_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod join_request {
        use super::*;

        /// Backed by a unique index on `(plan_id, requester_id)`.
        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "join_requests")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub plan_id: String,
            pub requester_id: String,
            pub message: Option<String>,
            pub status: String,
            pub created_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::{join_request, travel_plan};

// =============================================================================
// Conversions
// =============================================================================

fn parse_plan_status(value: &str) -> TravelPlanStatus {
    TravelPlanStatus::parse(value).unwrap_or(TravelPlanStatus::Cancelled)
}

fn parse_request_status(value: &str) -> JoinRequestStatus {
    match value {
        "PENDING" => JoinRequestStatus::Pending,
        "APPROVED" => JoinRequestStatus::Approved,
        _ => JoinRequestStatus::Rejected,
    }
}

fn model_to_plan(model: travel_plan::Model) -> TravelPlan {
    TravelPlan {
        status: parse_plan_status(&model.status),
        id: model.id,
        owner_id: model.owner_id,
        title: model.title,
        destination: model.destination,
        description: model.description,
        max_occupants: u32::try_from(model.max_occupants).unwrap_or(0),
        is_deleted: model.is_deleted,
        created_at: model.created_at.with_timezone(&chrono::Utc),
    }
}

fn plan_to_active_model(plan: &TravelPlan) -> travel_plan::ActiveModel {
    travel_plan::ActiveModel {
        id: Set(plan.id.clone()),
        owner_id: Set(plan.owner_id.clone()),
        title: Set(plan.title.clone()),
        destination: Set(plan.destination.clone()),
        description: Set(plan.description.clone()),
        max_occupants: Set(i32::try_from(plan.max_occupants).unwrap_or(i32::MAX)),
        status: Set(plan.status.as_str().to_string()),
        is_deleted: Set(plan.is_deleted),
        created_at: Set(plan.created_at.fixed_offset()),
    }
}

fn model_to_request(model: join_request::Model) -> JoinRequest {
    JoinRequest {
        status: parse_request_status(&model.status),
        id: model.id,
        plan_id: model.plan_id,
        requester_id: model.requester_id,
        message: model.message,
        created_at: model.created_at.with_timezone(&chrono::Utc),
    }
}

fn request_to_active_model(request: &JoinRequest) -> join_request::ActiveModel {
    join_request::ActiveModel {
        id: Set(request.id.clone()),
        plan_id: Set(request.plan_id.clone()),
        requester_id: Set(request.requester_id.clone()),
        message: Set(request.message.clone()),
        status: Set(request.status.as_str().to_string()),
        created_at: Set(request.created_at.fixed_offset()),
    }
}

async fn approved_count<C: ConnectionTrait>(conn: &C, plan_id: &str) -> Result<u64> {
    join_request::Entity::find()
        .filter(join_request::Column::PlanId.eq(plan_id))
        .filter(join_request::Column::Status.eq(JoinRequestStatus::Approved.as_str()))
        .count(conn)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
}

// =============================================================================
// SeaOrmTravelStore
// =============================================================================

#[derive(Clone, Debug)]
pub struct SeaOrmTravelStore {
    db: DatabaseConnection,
}

impl SeaOrmTravelStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TravelStore for SeaOrmTravelStore {
    async fn create_plan(&self, plan: &TravelPlan, owned_plan_quota: Option<u32>) -> Result<()> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if let Some(quota) = owned_plan_quota {
            // Serialize quota-checked creates per owner. A row lock
            // cannot help here (the conflict is with an insert), so take
            // an advisory lock scoped to this transaction.
            txn.execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "SELECT pg_advisory_xact_lock(hashtext($1))",
                [plan.owner_id.clone().into()],
            ))
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

            let owned = travel_plan::Entity::find()
                .filter(travel_plan::Column::OwnerId.eq(&plan.owner_id))
                .filter(travel_plan::Column::IsDeleted.eq(false))
                .count(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            if owned >= u64::from(quota) {
                return Err(TravelError::PlanQuotaExceeded { limit: quota }.into());
            }
        }

        travel_plan::Entity::insert(plan_to_active_model(plan))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn find_plan(&self, plan_id: &str) -> Result<Option<TravelPlan>> {
        let model = travel_plan::Entity::find_by_id(plan_id)
            .one(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(model.map(model_to_plan))
    }

    async fn list_open_plans(&self, offset: u64, limit: u64) -> Result<Page<TravelPlan>> {
        let query = travel_plan::Entity::find()
            .filter(travel_plan::Column::IsDeleted.eq(false))
            .filter(travel_plan::Column::Status.eq(TravelPlanStatus::Open.as_str()));

        let total = query
            .clone()
            .count(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let models = query
            .order_by_desc(travel_plan::Column::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(Page {
            items: models.into_iter().map(model_to_plan).collect(),
            total,
        })
    }

    async fn list_plans_by_owner(&self, owner_id: &str) -> Result<Vec<TravelPlan>> {
        let models = travel_plan::Entity::find()
            .filter(travel_plan::Column::OwnerId.eq(owner_id))
            .filter(travel_plan::Column::IsDeleted.eq(false))
            .order_by_desc(travel_plan::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(models.into_iter().map(model_to_plan).collect())
    }

    async fn count_owned_plans(&self, owner_id: &str) -> Result<u64> {
        travel_plan::Entity::find()
            .filter(travel_plan::Column::OwnerId.eq(owner_id))
            .filter(travel_plan::Column::IsDeleted.eq(false))
            .count(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set_plan_status(
        &self,
        plan_id: &str,
        owner_id: &str,
        status: TravelPlanStatus,
    ) -> Result<TravelPlan> {
        let updated = travel_plan::Entity::update_many()
            .col_expr(travel_plan::Column::Status, Expr::value(status.as_str()))
            .filter(travel_plan::Column::Id.eq(plan_id))
            .filter(travel_plan::Column::OwnerId.eq(owner_id))
            .filter(travel_plan::Column::IsDeleted.eq(false))
            .exec(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if updated.rows_affected == 0 {
            return Err(TravelError::PlanNotFound {
                plan_id: plan_id.to_string(),
            }
            .into());
        }

        self.find_plan(plan_id).await?.ok_or_else(|| {
            AppError::Database(format!("plan {} vanished after update", plan_id))
        })
    }

    async fn soft_delete_plan(&self, plan_id: &str, owner_id: &str) -> Result<()> {
        let updated = travel_plan::Entity::update_many()
            .col_expr(travel_plan::Column::IsDeleted, Expr::value(true))
            .filter(travel_plan::Column::Id.eq(plan_id))
            .filter(travel_plan::Column::OwnerId.eq(owner_id))
            .filter(travel_plan::Column::IsDeleted.eq(false))
            .exec(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if updated.rows_affected == 0 {
            return Err(TravelError::PlanNotFound {
                plan_id: plan_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    async fn count_approved(&self, plan_id: &str) -> Result<u64> {
        approved_count(&self.db, plan_id).await
    }

    async fn create_join_request(&self, request: &JoinRequest) -> Result<JoinRequest> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let plan = travel_plan::Entity::find_by_id(&request.plan_id)
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .filter(|p| !p.is_deleted)
            .map(model_to_plan)
            .ok_or(TravelError::PlanNotFound {
                plan_id: request.plan_id.clone(),
            })?;

        if plan.status != TravelPlanStatus::Open {
            return Err(TravelError::PlanNotOpen { plan_id: plan.id }.into());
        }
        if plan.owner_id == request.requester_id {
            return Err(TravelError::OwnPlanJoin { plan_id: plan.id }.into());
        }
        if approved_count(&txn, &plan.id).await? >= u64::from(plan.max_occupants) {
            return Err(TravelError::PlanFull {
                plan_id: plan.id,
                max_occupants: plan.max_occupants,
            }
            .into());
        }

        // The unique index on (plan_id, requester_id) is the race-safe
        // uniqueness guard; the conflict surfaces as a typed error.
        let insert = join_request::Entity::insert(request_to_active_model(request))
            .on_conflict(
                OnConflict::columns([
                    join_request::Column::PlanId,
                    join_request::Column::RequesterId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .do_nothing()
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if matches!(insert, sea_orm::TryInsertResult::Conflicted) {
            return Err(TravelError::DuplicateRequest { plan_id: plan.id }.into());
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(request.clone())
    }

    async fn find_request(&self, request_id: &str) -> Result<Option<JoinRequest>> {
        let model = join_request::Entity::find_by_id(request_id)
            .one(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(model.map(model_to_request))
    }

    async fn requests_by_requester(&self, requester_id: &str) -> Result<Vec<JoinRequest>> {
        let models = join_request::Entity::find()
            .filter(join_request::Column::RequesterId.eq(requester_id))
            .order_by_desc(join_request::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(models.into_iter().map(model_to_request).collect())
    }

    async fn pending_requests_for_owner(
        &self,
        owner_id: &str,
    ) -> Result<Vec<(JoinRequest, TravelPlan)>> {
        let plans = travel_plan::Entity::find()
            .filter(travel_plan::Column::OwnerId.eq(owner_id))
            .filter(travel_plan::Column::IsDeleted.eq(false))
            .all(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        if plans.is_empty() {
            return Ok(Vec::new());
        }

        let by_id: std::collections::HashMap<String, TravelPlan> = plans
            .into_iter()
            .map(|p| (p.id.clone(), model_to_plan(p)))
            .collect();

        let requests = join_request::Entity::find()
            .filter(join_request::Column::PlanId.is_in(by_id.keys().cloned()))
            .filter(join_request::Column::Status.eq(JoinRequestStatus::Pending.as_str()))
            .order_by_desc(join_request::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(requests
            .into_iter()
            .filter_map(|r| {
                let plan = by_id.get(&r.plan_id)?.clone();
                Some((model_to_request(r), plan))
            })
            .collect())
    }

    async fn resolve_request(
        &self,
        request_id: &str,
        owner_id: &str,
        decision: RequestDecision,
    ) -> Result<JoinRequest> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let request = join_request::Entity::find_by_id(request_id)
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .map(model_to_request)
            .ok_or(TravelError::RequestNotFound {
                request_id: request_id.to_string(),
            })?;

        // Exclusive lock on the plan row serializes every resolution for
        // this plan, which is what makes the occupancy re-check below
        // safe against concurrent approvals.
        let plan = travel_plan::Entity::find_by_id(&request.plan_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .map(model_to_plan)
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

        if decision == RequestDecision::Approved
            && approved_count(&txn, &plan.id).await? >= u64::from(plan.max_occupants)
        {
            return Err(TravelError::PlanFull {
                plan_id: plan.id,
                max_occupants: plan.max_occupants,
            }
            .into());
        }

        let new_status = decision.as_status();
        let updated = join_request::Entity::update_many()
            .col_expr(
                join_request::Column::Status,
                Expr::value(new_status.as_str()),
            )
            .filter(join_request::Column::Id.eq(request_id))
            .filter(join_request::Column::Status.eq(JoinRequestStatus::Pending.as_str()))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if updated.rows_affected == 0 {
            return Err(TravelError::AlreadyResolved {
                request_id: request_id.to_string(),
                status: request.status,
            }
            .into());
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(JoinRequest {
            status: new_status,
            ..request
        })
    }
}
