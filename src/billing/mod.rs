//! Entitlement reconciliation.
//!
//! Keeps the locally held entitlement record consistent with the
//! external billing authority, which notifies asynchronously, at least
//! once, and in no particular order. Local state is mutated from two
//! racing paths (the webhook reconciler and the client-invoked
//! confirmation fallback); both converge because every transition is an
//! idempotent upsert or conditional update keyed by a stable external
//! reference.
//!
//! - [`checkout::CheckoutInitiator`] opens purchase intents; it never
//!   grants entitlement.
//! - [`reconciler::EventReconciler`] applies lifecycle notifications.
//! - [`subscription::SubscriptionManager`] owns the shared grant, the
//!   confirmation fallback, status reads, and cancellation.
//! - [`webhook::WebhookProcessor`] verifies delivery signatures.
//! - [`storage::EntitlementStore`] is the persistence seam; absence of a
//!   row is the FREE tier.

pub mod checkout;
pub mod client;
pub mod error;
pub mod legacy;
pub mod live_client;
pub mod plans;
pub mod reconciler;
pub mod storage;
pub mod subscription;
pub mod webhook;

#[cfg(feature = "database")]
pub mod sea_orm_store;

pub use checkout::{CheckoutConfig, CheckoutInitiator};
pub use client::{
    BillingAuthorityClient, CheckoutSession, CheckoutSessionDetails, CreateCheckoutSessionRequest,
    CreateCustomerRequest, SubscriptionDetails,
};
pub use error::BillingError;
pub use legacy::LegacyGateway;
pub use live_client::{InvalidApiKeyError, LiveBillingClient, LiveClientConfig};
pub use plans::{FreeTierLimits, PlanCatalog, PlanTier, PREMIUM_FEATURES};
pub use reconciler::{EventReconciler, ReconcileOutcome};
pub use storage::{
    EntitlementRecord, EntitlementStatus, EntitlementStore, InMemoryEntitlementStore,
};
pub use subscription::{
    EntitlementView, PurchaseGrant, SubscriptionManager, SubscriptionStatusView,
};
pub use webhook::{sign_payload, WebhookEvent, WebhookEventData, WebhookProcessor};

#[cfg(feature = "database")]
pub use sea_orm_store::SeaOrmBillingStore;
