//! Payment and subscription endpoints, plus the webhook receiver.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::app::AppContext;
use crate::billing::plans::{PlanTier, PREMIUM_FEATURES};
use crate::billing::subscription::EntitlementView;
use crate::error::{AppError, Result};
use crate::http::{ApiResponse, AuthUser};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/payment/plans", get(get_plans))
        .route(
            "/payment/create-checkout-session",
            post(create_checkout_session),
        )
        .route("/payment/subscription/confirm", post(confirm_subscription))
        .route("/payment/subscription/status", get(subscription_status))
        .route("/payment/subscription/cancel", post(cancel_subscription))
}

/// Webhook receiver. The signature is verified over the raw body before
/// anything is parsed; verification failures are the only non-2xx path.
async fn handle_webhook(
    State(context): State<AppContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    let signature = headers
        .get("Stripe-Signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::bad_request("Missing Stripe-Signature header"))?;

    context.webhooks().process(&body, signature).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlanListing {
    plan: PlanTier,
    price_id: String,
    features: Vec<String>,
}

/// Public plan listing.
async fn get_plans(State(context): State<AppContext>) -> ApiResponse<Vec<PlanListing>> {
    let features: Vec<String> = PREMIUM_FEATURES.iter().map(|f| f.to_string()).collect();
    let listings = vec![
        PlanListing {
            plan: PlanTier::Monthly,
            price_id: context.catalog.monthly_price_id.clone(),
            features: features.clone(),
        },
        PlanListing {
            plan: PlanTier::Yearly,
            price_id: context.catalog.yearly_price_id.clone(),
            features,
        },
    ];
    ApiResponse::success(listings)
}

#[derive(Debug, Deserialize)]
struct CreateCheckoutBody {
    plan: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutSessionBody {
    url: String,
    session_id: String,
}

async fn create_checkout_session(
    State(context): State<AppContext>,
    user: AuthUser,
    Json(body): Json<CreateCheckoutBody>,
) -> Result<ApiResponse<CheckoutSessionBody>> {
    let plan = PlanTier::parse(&body.plan)?;
    let session = context
        .checkout()
        .create_checkout_session(&user.id, plan)
        .await?;
    Ok(ApiResponse::success(CheckoutSessionBody {
        url: session.url,
        session_id: session.id,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmBody {
    session_id: String,
}

async fn confirm_subscription(
    State(context): State<AppContext>,
    user: AuthUser,
    Json(body): Json<ConfirmBody>,
) -> Result<ApiResponse<EntitlementView>> {
    let record = context
        .subscriptions()
        .confirm_checkout(&user.id, &body.session_id)
        .await?;
    Ok(ApiResponse::success_with_message(
        record.into(),
        "Subscription confirmed",
    ))
}

async fn subscription_status(
    State(context): State<AppContext>,
    user: AuthUser,
) -> Result<ApiResponse<crate::billing::SubscriptionStatusView>> {
    let status = context.subscriptions().status(&user.id).await?;
    Ok(ApiResponse::success(status))
}

async fn cancel_subscription(
    State(context): State<AppContext>,
    user: AuthUser,
) -> Result<ApiResponse<serde_json::Value>> {
    context.subscriptions().cancel(&user.id).await?;
    Ok(ApiResponse::success_with_message(
        json!(null),
        "Subscription cancelled successfully",
    ))
}
