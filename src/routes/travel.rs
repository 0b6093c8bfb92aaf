//! Travel plan and join request endpoints. Nested under `/travel-plans`.

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, patch, post},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::app::AppContext;
use crate::error::{AppError, Result};
use crate::http::{ApiResponse, AuthUser, Paginated, PaginationQuery};
use crate::travel::{
    JoinRequest, NewTravelPlan, RequestDecision, TravelError, TravelPlan, TravelPlanStatus,
};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/", get(list_plans).post(create_plan))
        .route("/requests/send", post(send_request))
        .route("/requests/my", get(my_requests))
        .route("/requests/pending", get(pending_requests))
        .route("/requests/{id}/respond", patch(respond_to_request))
        .route("/my/plans", get(my_plans))
        .route("/{id}", get(get_plan).delete(delete_plan))
        .route("/{id}/status", patch(update_plan_status))
}

/// Create a listing. Free-tier owners are quota-checked atomically with
/// the insert; premium owners and admins are not.
async fn create_plan(
    State(context): State<AppContext>,
    user: AuthUser,
    Json(body): Json<NewTravelPlan>,
) -> Result<ApiResponse<TravelPlan>> {
    if body.max_occupants == 0 {
        return Err(AppError::bad_request("maxOccupants must be at least 1"));
    }

    let account = context
        .accounts
        .find(&user.id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Account not found: {}", user.id)))?;
    let quota = context.limiter().listing_quota(&account).await?;

    let plan = TravelPlan {
        id: Uuid::new_v4().to_string(),
        owner_id: user.id.clone(),
        title: body.title,
        destination: body.destination,
        description: body.description,
        max_occupants: body.max_occupants,
        status: TravelPlanStatus::Open,
        is_deleted: false,
        created_at: Utc::now(),
    };
    context.travel.create_plan(&plan, quota).await?;

    Ok(ApiResponse::success_with_message(
        plan,
        "Travel plan created successfully",
    ))
}

/// Public listing of OPEN plans.
async fn list_plans(
    State(context): State<AppContext>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<ApiResponse<Paginated<TravelPlan>>> {
    let page = context
        .travel
        .list_open_plans(pagination.offset(), pagination.clamped_limit())
        .await?;
    Ok(ApiResponse::success(Paginated::new(
        &pagination,
        page.total,
        page.items,
    )))
}

async fn get_plan(
    State(context): State<AppContext>,
    Path(id): Path<String>,
) -> Result<ApiResponse<TravelPlan>> {
    let plan = context
        .travel
        .find_plan(&id)
        .await?
        .filter(|p| !p.is_deleted)
        .ok_or(TravelError::PlanNotFound { plan_id: id })?;
    Ok(ApiResponse::success(plan))
}

async fn my_plans(
    State(context): State<AppContext>,
    user: AuthUser,
) -> Result<ApiResponse<Vec<TravelPlan>>> {
    let plans = context.travel.list_plans_by_owner(&user.id).await?;
    Ok(ApiResponse::success(plans))
}

#[derive(Debug, Deserialize)]
struct UpdateStatusBody {
    status: String,
}

async fn update_plan_status(
    State(context): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateStatusBody>,
) -> Result<ApiResponse<TravelPlan>> {
    let status = TravelPlanStatus::parse(&body.status).ok_or_else(|| {
        AppError::bad_request(format!(
            "Unknown status: {}. Expected OPEN, COMPLETED or CANCELLED",
            body.status
        ))
    })?;
    let plan = context.travel.set_plan_status(&id, &user.id, status).await?;
    Ok(ApiResponse::success(plan))
}

async fn delete_plan(
    State(context): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<ApiResponse<serde_json::Value>> {
    context.travel.soft_delete_plan(&id, &user.id).await?;
    Ok(ApiResponse::success_with_message(
        json!(null),
        "Travel plan deleted successfully",
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRequestBody {
    travel_plan_id: String,
    message: Option<String>,
}

async fn send_request(
    State(context): State<AppContext>,
    user: AuthUser,
    Json(body): Json<SendRequestBody>,
) -> Result<ApiResponse<JoinRequest>> {
    let request = context
        .requests()
        .send_request(&user.id, &body.travel_plan_id, body.message)
        .await?;
    Ok(ApiResponse::success_with_message(
        request,
        "Travel request sent",
    ))
}

async fn my_requests(
    State(context): State<AppContext>,
    user: AuthUser,
) -> Result<ApiResponse<Vec<JoinRequest>>> {
    let requests = context.travel.requests_by_requester(&user.id).await?;
    Ok(ApiResponse::success(requests))
}

async fn pending_requests(
    State(context): State<AppContext>,
    user: AuthUser,
) -> Result<ApiResponse<Vec<serde_json::Value>>> {
    let pending = context.travel.pending_requests_for_owner(&user.id).await?;
    let items = pending
        .into_iter()
        .map(|(request, plan)| {
            json!({
                "request": request,
                "travelPlan": {
                    "id": plan.id,
                    "title": plan.title,
                    "destination": plan.destination,
                },
            })
        })
        .collect();
    Ok(ApiResponse::success(items))
}

#[derive(Debug, Deserialize)]
struct RespondBody {
    status: String,
}

async fn respond_to_request(
    State(context): State<AppContext>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(body): Json<RespondBody>,
) -> Result<ApiResponse<JoinRequest>> {
    let decision = match body.status.as_str() {
        "APPROVED" => RequestDecision::Approved,
        "REJECTED" => RequestDecision::Rejected,
        other => {
            return Err(AppError::bad_request(format!(
                "Unknown status: {}. Expected APPROVED or REJECTED",
                other
            )));
        }
    };
    let resolved = context.requests().respond(&user.id, &id, decision).await?;
    Ok(ApiResponse::success(resolved))
}
