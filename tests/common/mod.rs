//! Shared fixtures for the integration tests.

// Each test binary compiles its own copy; not all of them use every helper.
#![allow(dead_code)]

use std::sync::Arc;

use secrecy::SecretString;
use trekmate::AppContext;
use trekmate::accounts::InMemoryAccountStore;
use trekmate::billing::client::mock::MockBillingClient;
use trekmate::billing::{CheckoutConfig, InMemoryEntitlementStore, PlanCatalog};
use trekmate::email::ConsoleMailer;
use trekmate::travel::InMemoryTravelStore;

pub const WEBHOOK_SECRET: &str = "whsec_integration_test";
pub const JWT_SECRET: &str = "jwt_integration_test";

pub struct TestApp {
    pub context: AppContext,
    pub accounts: InMemoryAccountStore,
    pub entitlements: InMemoryEntitlementStore,
    pub travel: InMemoryTravelStore,
    pub billing: Arc<MockBillingClient>,
}

pub fn test_app() -> TestApp {
    let accounts = InMemoryAccountStore::new();
    let entitlements = InMemoryEntitlementStore::new();
    let travel = InMemoryTravelStore::new();
    let billing = Arc::new(MockBillingClient::new());

    let context = AppContext::builder()
        .with_accounts(Arc::new(accounts.clone()))
        .with_entitlements(Arc::new(entitlements.clone()))
        .with_travel(Arc::new(travel.clone()))
        .with_billing_client(billing.clone())
        .with_mailer(Arc::new(ConsoleMailer::new()))
        .with_catalog(PlanCatalog::new("price_monthly", "price_yearly"))
        .with_checkout_config(CheckoutConfig::from_client_url("https://app.example.com"))
        .with_webhook_secret(SecretString::new(WEBHOOK_SECRET.to_string()))
        .with_jwt_secret(SecretString::new(JWT_SECRET.to_string()))
        .build()
        .expect("complete test context");

    TestApp {
        context,
        accounts,
        entitlements,
        travel,
        billing,
    }
}

pub fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}
