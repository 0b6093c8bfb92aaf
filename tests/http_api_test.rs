//! The HTTP surface: webhook status-code policy, auth boundary, and the
//! payment and join-request endpoints end to end.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::{test_app, unix_now, JWT_SECRET, WEBHOOK_SECRET};
use serde_json::{Value, json};
use tower::ServiceExt;
use trekmate::accounts::Role;
use trekmate::billing::sign_payload;
use trekmate::http::issue_access_token;
use trekmate::travel::TravelStore;

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn bearer(account_id: &str, role: Role) -> String {
    format!(
        "Bearer {}",
        issue_access_token(JWT_SECRET, account_id, role, 3600)
    )
}

fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get_with_token(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, token)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn webhook_rejects_bad_signatures_with_400() {
    let app = test_app();
    let router = app.context.into_router();

    let payload = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "created": unix_now(),
        "data": { "object": {} }
    })
    .to_string();

    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("Stripe-Signature", "t=123,v1=deadbeef")
        .body(Body::from(payload))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_missing_signature_header_is_400() {
    let app = test_app();
    let router = app.context.into_router();

    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .body(Body::from("{}"))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn webhook_acknowledges_unknown_event_types() {
    let app = test_app();
    let router = app.context.into_router();

    let payload = json!({
        "id": "evt_1",
        "type": "some.future.event",
        "created": unix_now(),
        "data": { "object": {} }
    })
    .to_string();
    let signature = sign_payload(WEBHOOK_SECRET, payload.as_bytes(), unix_now());

    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("Stripe-Signature", signature)
        .body(Body::from(payload))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], json!(true));
}

#[tokio::test]
async fn webhook_acknowledges_cancellation_with_no_matching_row() {
    let app = test_app();
    let router = app.context.into_router();

    let payload = json!({
        "id": "evt_1",
        "type": "customer.subscription.deleted",
        "created": unix_now(),
        "data": { "object": { "id": "sub_unknown" } }
    })
    .to_string();
    let signature = sign_payload(WEBHOOK_SECRET, payload.as_bytes(), unix_now());

    let request = Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("Stripe-Signature", signature)
        .body(Body::from(payload))
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_endpoints_require_a_token() {
    let app = test_app();
    let router = app.context.into_router();

    let request = Request::builder()
        .method("GET")
        .uri("/payment/subscription/status")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn checkout_confirm_status_cancel_through_the_api() {
    let app = test_app();
    app.accounts.seed("acc_1", Role::User);
    let router = app.context.clone().into_router();
    let token = bearer("acc_1", Role::User);

    // Fresh account: free tier.
    let response = router
        .clone()
        .oneshot(get_with_token("/payment/subscription/status", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["hasSubscription"], json!(false));
    assert_eq!(body["data"]["freeTierLimits"]["max_travel_plans"], json!(3));

    // Open a checkout session.
    let response = router
        .clone()
        .oneshot(post_json(
            "/payment/create-checkout-session",
            Some(&token),
            json!({ "plan": "MONTHLY" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let session_id = body["data"]["sessionId"].as_str().unwrap().to_string();
    assert!(body["data"]["url"].as_str().unwrap().contains(&session_id));

    // Confirming before payment is a conflict.
    let response = router
        .clone()
        .oneshot(post_json(
            "/payment/subscription/confirm",
            Some(&token),
            json!({ "sessionId": session_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // The customer pays; confirmation now grants.
    app.billing.complete_session(&session_id);
    let response = router
        .clone()
        .oneshot(post_json(
            "/payment/subscription/confirm",
            Some(&token),
            json!({ "sessionId": session_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["plan"], json!("MONTHLY"));
    assert_eq!(body["data"]["status"], json!("ACTIVE"));

    // Status now reports the subscription and the feature list.
    let response = router
        .clone()
        .oneshot(get_with_token("/payment/subscription/status", &token))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["hasSubscription"], json!(true));
    assert!(body["data"]["features"]
        .as_array()
        .unwrap()
        .contains(&json!("premium_badge")));

    // A second checkout while active conflicts.
    let response = router
        .clone()
        .oneshot(post_json(
            "/payment/create-checkout-session",
            Some(&token),
            json!({ "plan": "YEARLY" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Cancel and fall back to the free tier.
    let response = router
        .clone()
        .oneshot(post_json(
            "/payment/subscription/cancel",
            Some(&token),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .oneshot(get_with_token("/payment/subscription/status", &token))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["hasSubscription"], json!(false));
}

#[tokio::test]
async fn foreign_session_confirmation_is_forbidden() {
    let app = test_app();
    app.accounts.seed("acc_1", Role::User);
    app.accounts.seed("acc_2", Role::User);
    let router = app.context.clone().into_router();

    let response = router
        .clone()
        .oneshot(post_json(
            "/payment/create-checkout-session",
            Some(&bearer("acc_1", Role::User)),
            json!({ "plan": "MONTHLY" }),
        ))
        .await
        .unwrap();
    let body = body_json(response).await;
    let session_id = body["data"]["sessionId"].as_str().unwrap().to_string();
    app.billing.complete_session(&session_id);

    let response = router
        .oneshot(post_json(
            "/payment/subscription/confirm",
            Some(&bearer("acc_2", Role::User)),
            json!({ "sessionId": session_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn join_request_flow_through_the_api() {
    let app = test_app();
    app.accounts.seed("owner", Role::User);
    app.accounts.seed("acc_a", Role::User);
    app.accounts.seed("acc_b", Role::User);
    let router = app.context.clone().into_router();
    let owner_token = bearer("owner", Role::User);

    // Owner creates a single-seat plan.
    let response = router
        .clone()
        .oneshot(post_json(
            "/travel-plans",
            Some(&owner_token),
            json!({
                "title": "Kyoto in autumn",
                "destination": "Japan",
                "maxOccupants": 1
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let plan_id = body["data"]["id"].as_str().unwrap().to_string();

    // Two travellers request to join.
    let response = router
        .clone()
        .oneshot(post_json(
            "/travel-plans/requests/send",
            Some(&bearer("acc_a", Role::User)),
            json!({ "travelPlanId": plan_id, "message": "count me in" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let request_a = body_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = router
        .clone()
        .oneshot(post_json(
            "/travel-plans/requests/send",
            Some(&bearer("acc_b", Role::User)),
            json!({ "travelPlanId": plan_id }),
        ))
        .await
        .unwrap();
    let request_b = body_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    // Duplicate from A conflicts.
    let response = router
        .clone()
        .oneshot(post_json(
            "/travel-plans/requests/send",
            Some(&bearer("acc_a", Role::User)),
            json!({ "travelPlanId": plan_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Owner cannot join their own plan.
    let response = router
        .clone()
        .oneshot(post_json(
            "/travel-plans/requests/send",
            Some(&owner_token),
            json!({ "travelPlanId": plan_id }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Only the owner may respond.
    let response = router
        .clone()
        .oneshot(post_json_patch(
            &format!("/travel-plans/requests/{}/respond", request_a),
            &bearer("acc_b", Role::User),
            json!({ "status": "APPROVED" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    // Owner approves A.
    let response = router
        .clone()
        .oneshot(post_json_patch(
            &format!("/travel-plans/requests/{}/respond", request_a),
            &owner_token,
            json!({ "status": "APPROVED" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], json!("APPROVED"));

    // Approving B now fails: the plan is full. B stays PENDING.
    let response = router
        .clone()
        .oneshot(post_json_patch(
            &format!("/travel-plans/requests/{}/respond", request_b),
            &owner_token,
            json!({ "status": "APPROVED" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("full"));

    let b_after = app.travel.find_request(&request_b).await.unwrap().unwrap();
    assert_eq!(
        b_after.status,
        trekmate::travel::JoinRequestStatus::Pending
    );
}

#[tokio::test]
async fn free_tier_quota_surfaces_through_the_api() {
    let app = test_app();
    app.accounts.seed("acc_1", Role::User);
    let router = app.context.into_router();
    let token = bearer("acc_1", Role::User);

    for i in 0..3 {
        let response = router
            .clone()
            .oneshot(post_json(
                "/travel-plans",
                Some(&token),
                json!({
                    "title": format!("Trip {}", i),
                    "destination": "Anywhere",
                    "maxOccupants": 2
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = router
        .oneshot(post_json(
            "/travel-plans",
            Some(&token),
            json!({
                "title": "One too many",
                "destination": "Anywhere",
                "maxOccupants": 2
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("3 travel plans"));
}

fn post_json_patch(uri: &str, token: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PATCH")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, token)
        .body(Body::from(body.to_string()))
        .unwrap()
}
