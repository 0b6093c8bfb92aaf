//! End-to-end reconciliation properties: idempotence across duplicate
//! deliveries and convergence between the webhook path and the
//! client-invoked confirmation fallback.

mod common;

use common::{test_app, unix_now, WEBHOOK_SECRET};
use serde_json::json;
use trekmate::accounts::{AccountStore, Role};
use trekmate::billing::{
    sign_payload, EntitlementStatus, EntitlementStore, PlanTier, ReconcileOutcome,
};

fn signed(payload: &str) -> (Vec<u8>, String) {
    let signature = sign_payload(WEBHOOK_SECRET, payload.as_bytes(), unix_now());
    (payload.as_bytes().to_vec(), signature)
}

fn checkout_completed_event(
    event_id: &str,
    session_id: &str,
    account_id: &str,
    plan: &str,
    subscription_ref: &str,
) -> String {
    json!({
        "id": event_id,
        "type": "checkout.session.completed",
        "created": unix_now(),
        "data": {
            "object": {
                "id": session_id,
                "payment_status": "paid",
                "customer": "cus_1",
                "subscription": subscription_ref,
                "metadata": { "account_id": account_id, "plan": plan }
            }
        }
    })
    .to_string()
}

#[tokio::test]
async fn duplicate_webhook_delivery_is_idempotent() {
    let app = test_app();
    app.accounts.seed("acc_1", Role::User);
    let processor = app.context.webhooks();

    let payload = checkout_completed_event("evt_1", "cs_1", "acc_1", "MONTHLY", "sub_1");
    let (body, signature) = signed(&payload);

    processor.process(&body, &signature).await.unwrap();
    let first = app.entitlements.get("acc_1").await.unwrap().unwrap();

    // Same delivery again, as the authority's at-least-once contract allows.
    processor.process(&body, &signature).await.unwrap();
    let second = app.entitlements.get("acc_1").await.unwrap().unwrap();

    assert_eq!(first, second);
    assert_eq!(app.entitlements.len(), 1);
    assert!(app.accounts.find("acc_1").await.unwrap().unwrap().premium_badge);
}

#[tokio::test]
async fn webhook_then_confirmation_converges_to_one_row() {
    let app = test_app();
    app.accounts.seed("acc_1", Role::User);

    // A checkout the client initiated through the real path.
    let session = app
        .context
        .checkout()
        .create_checkout_session("acc_1", PlanTier::Monthly)
        .await
        .unwrap();
    let subscription_ref = app.billing.complete_session(&session.id);

    // The webhook wins the race.
    let payload =
        checkout_completed_event("evt_1", &session.id, "acc_1", "MONTHLY", &subscription_ref);
    let (body, signature) = signed(&payload);
    app.context.webhooks().process(&body, &signature).await.unwrap();

    // Then the client lands on the success page and confirms anyway.
    let record = app
        .context
        .subscriptions()
        .confirm_checkout("acc_1", &session.id)
        .await
        .unwrap();

    assert_eq!(app.entitlements.len(), 1);
    assert_eq!(record.subscription_ref, subscription_ref);
    assert!(record.is_active());
    assert!(app.accounts.find("acc_1").await.unwrap().unwrap().premium_badge);
}

#[tokio::test]
async fn confirmation_then_webhook_converges_to_one_row() {
    let app = test_app();
    app.accounts.seed("acc_1", Role::User);

    let session = app
        .context
        .checkout()
        .create_checkout_session("acc_1", PlanTier::Yearly)
        .await
        .unwrap();
    let subscription_ref = app.billing.complete_session(&session.id);

    // The client confirms before the webhook arrives.
    let confirmed = app
        .context
        .subscriptions()
        .confirm_checkout("acc_1", &session.id)
        .await
        .unwrap();

    let payload =
        checkout_completed_event("evt_1", &session.id, "acc_1", "YEARLY", &subscription_ref);
    let (body, signature) = signed(&payload);
    app.context.webhooks().process(&body, &signature).await.unwrap();

    let after_webhook = app.entitlements.get("acc_1").await.unwrap().unwrap();
    assert_eq!(app.entitlements.len(), 1);
    assert_eq!(after_webhook.plan, PlanTier::Yearly);
    assert_eq!(after_webhook.subscription_ref, confirmed.subscription_ref);
    // The late webhook must not restart the validity window.
    assert_eq!(after_webhook.start_date, confirmed.start_date);
    assert_eq!(after_webhook.end_date, confirmed.end_date);
}

#[tokio::test]
async fn cancellation_for_unknown_reference_is_acknowledged() {
    let app = test_app();
    let payload = json!({
        "id": "evt_1",
        "type": "customer.subscription.deleted",
        "created": unix_now(),
        "data": { "object": { "id": "sub_never_seen" } }
    })
    .to_string();
    let (body, signature) = signed(&payload);

    let outcome = app.context.webhooks().process(&body, &signature).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::NoOp);
    assert!(app.entitlements.is_empty());
}

#[tokio::test]
async fn confirming_an_unpaid_session_mutates_nothing() {
    let app = test_app();
    app.accounts.seed("acc_1", Role::User);

    let session = app
        .context
        .checkout()
        .create_checkout_session("acc_1", PlanTier::Monthly)
        .await
        .unwrap();
    // Session is never paid.

    let err = app
        .context
        .subscriptions()
        .confirm_checkout("acc_1", &session.id)
        .await
        .unwrap_err();
    assert!(matches!(err, trekmate::AppError::Conflict(_)));
    assert!(app.entitlements.is_empty());
    assert!(!app.accounts.find("acc_1").await.unwrap().unwrap().premium_badge);
}

#[tokio::test]
async fn full_lifecycle_grant_lapse_recover_cancel() {
    let app = test_app();
    app.accounts.seed("acc_1", Role::User);
    let processor = app.context.webhooks();

    let purchase = checkout_completed_event("evt_1", "cs_1", "acc_1", "MONTHLY", "sub_1");
    let (body, signature) = signed(&purchase);
    processor.process(&body, &signature).await.unwrap();

    // Payment fails: lapsed, but the row survives.
    let failed = json!({
        "id": "evt_2",
        "type": "invoice.payment_failed",
        "created": unix_now(),
        "data": { "object": { "id": "in_1", "subscription": "sub_1" } }
    })
    .to_string();
    let (body, signature) = signed(&failed);
    processor.process(&body, &signature).await.unwrap();
    let record = app.entitlements.get("acc_1").await.unwrap().unwrap();
    assert_eq!(record.status, EntitlementStatus::Expired);

    // The card recovers.
    let recovered = json!({
        "id": "evt_3",
        "type": "customer.subscription.updated",
        "created": unix_now(),
        "data": { "object": { "id": "sub_1", "status": "active" } }
    })
    .to_string();
    let (body, signature) = signed(&recovered);
    processor.process(&body, &signature).await.unwrap();
    assert!(app.entitlements.get("acc_1").await.unwrap().unwrap().is_active());

    // Finally cancelled: back to the implicit FREE tier.
    let cancelled = json!({
        "id": "evt_4",
        "type": "customer.subscription.deleted",
        "created": unix_now(),
        "data": { "object": { "id": "sub_1" } }
    })
    .to_string();
    let (body, signature) = signed(&cancelled);
    processor.process(&body, &signature).await.unwrap();
    assert!(app.entitlements.get("acc_1").await.unwrap().is_none());
    assert!(!app.accounts.find("acc_1").await.unwrap().unwrap().premium_badge);
}
