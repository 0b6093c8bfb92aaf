//! Application context and router assembly.
//!
//! All shared state lives behind trait objects so the same handlers run
//! against the in-memory stores in tests and the SeaORM stores in
//! production. The context is cheap to clone; managers are assembled on
//! demand from the shared parts.

use secrecy::SecretString;
use std::sync::Arc;

use crate::accounts::AccountStore;
use crate::billing::{
    BillingAuthorityClient, CheckoutConfig, CheckoutInitiator, EntitlementStore, EventReconciler,
    PlanCatalog, SubscriptionManager, WebhookProcessor,
};
use crate::email::Mailer;
use crate::travel::{PlanLimiter, TravelRequestManager, TravelStore};

/// Shared application state.
#[derive(Clone)]
pub struct AppContext {
    pub accounts: Arc<dyn AccountStore>,
    pub entitlements: Arc<dyn EntitlementStore>,
    pub travel: Arc<dyn TravelStore>,
    pub billing_client: Arc<dyn BillingAuthorityClient>,
    pub mailer: Arc<dyn Mailer>,
    pub catalog: PlanCatalog,
    pub checkout_config: CheckoutConfig,
    pub webhook_secret: SecretString,
    pub jwt_secret: SecretString,
}

impl AppContext {
    pub fn builder() -> AppContextBuilder {
        AppContextBuilder::default()
    }

    #[must_use]
    pub fn subscriptions(&self) -> SubscriptionManager {
        SubscriptionManager::new(
            self.entitlements.clone(),
            self.accounts.clone(),
            self.billing_client.clone(),
            self.catalog.clone(),
        )
    }

    #[must_use]
    pub fn checkout(&self) -> CheckoutInitiator {
        CheckoutInitiator::new(
            self.entitlements.clone(),
            self.accounts.clone(),
            self.billing_client.clone(),
            self.catalog.clone(),
            self.checkout_config.clone(),
        )
    }

    #[must_use]
    pub fn reconciler(&self) -> EventReconciler {
        EventReconciler::new(
            self.subscriptions(),
            self.entitlements.clone(),
            self.accounts.clone(),
            self.billing_client.clone(),
        )
    }

    #[must_use]
    pub fn webhooks(&self) -> WebhookProcessor {
        WebhookProcessor::new(self.webhook_secret.clone(), self.reconciler())
    }

    #[must_use]
    pub fn limiter(&self) -> PlanLimiter {
        PlanLimiter::new(self.entitlements.clone(), self.catalog.free_limits)
    }

    #[must_use]
    pub fn requests(&self) -> TravelRequestManager {
        TravelRequestManager::new(
            self.travel.clone(),
            self.accounts.clone(),
            self.mailer.clone(),
        )
    }

    /// The full application router with tracing.
    pub fn into_router(self) -> axum::Router {
        crate::routes::router(self)
    }
}

/// Builder for [`AppContext`].
#[must_use = "builder does nothing until you call build()"]
#[derive(Default)]
pub struct AppContextBuilder {
    accounts: Option<Arc<dyn AccountStore>>,
    entitlements: Option<Arc<dyn EntitlementStore>>,
    travel: Option<Arc<dyn TravelStore>>,
    billing_client: Option<Arc<dyn BillingAuthorityClient>>,
    mailer: Option<Arc<dyn Mailer>>,
    catalog: Option<PlanCatalog>,
    checkout_config: Option<CheckoutConfig>,
    webhook_secret: Option<SecretString>,
    jwt_secret: Option<SecretString>,
}

impl AppContextBuilder {
    pub fn with_accounts(mut self, accounts: Arc<dyn AccountStore>) -> Self {
        self.accounts = Some(accounts);
        self
    }

    pub fn with_entitlements(mut self, entitlements: Arc<dyn EntitlementStore>) -> Self {
        self.entitlements = Some(entitlements);
        self
    }

    pub fn with_travel(mut self, travel: Arc<dyn TravelStore>) -> Self {
        self.travel = Some(travel);
        self
    }

    pub fn with_billing_client(mut self, client: Arc<dyn BillingAuthorityClient>) -> Self {
        self.billing_client = Some(client);
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn with_catalog(mut self, catalog: PlanCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_checkout_config(mut self, config: CheckoutConfig) -> Self {
        self.checkout_config = Some(config);
        self
    }

    pub fn with_webhook_secret(mut self, secret: SecretString) -> Self {
        self.webhook_secret = Some(secret);
        self
    }

    pub fn with_jwt_secret(mut self, secret: SecretString) -> Self {
        self.jwt_secret = Some(secret);
        self
    }

    /// Build the context, failing on any missing part.
    pub fn build(self) -> crate::error::Result<AppContext> {
        fn required<T>(value: Option<T>, name: &str) -> crate::error::Result<T> {
            value.ok_or_else(|| {
                crate::error::AppError::internal(format!("{} not configured", name))
            })
        }

        Ok(AppContext {
            accounts: required(self.accounts, "accounts store")?,
            entitlements: required(self.entitlements, "entitlement store")?,
            travel: required(self.travel, "travel store")?,
            billing_client: required(self.billing_client, "billing client")?,
            mailer: required(self.mailer, "mailer")?,
            catalog: required(self.catalog, "plan catalog")?,
            checkout_config: required(self.checkout_config, "checkout config")?,
            webhook_secret: required(self.webhook_secret, "webhook secret")?,
            jwt_secret: required(self.jwt_secret, "jwt secret")?,
        })
    }
}
