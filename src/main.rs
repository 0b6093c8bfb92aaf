use std::sync::Arc;

use sea_orm::Database;

use trekmate::billing::{
    CheckoutConfig, LiveBillingClient, LiveClientConfig, PlanCatalog, SeaOrmBillingStore,
};
use trekmate::email::{ApiMailer, ApiMailerConfig};
use trekmate::travel::SeaOrmTravelStore;
use trekmate::{AppContext, ConfigBuilder};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigBuilder::new().from_env().build()?;
    trekmate::init_tracing_with_config(&config);

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?;
    let db = Database::connect(&database_url).await?;

    let billing_store = SeaOrmBillingStore::new(db.clone());
    let travel_store = SeaOrmTravelStore::new(db.clone());

    let billing_client = LiveBillingClient::new(
        config.billing.secret_key.clone(),
        LiveClientConfig::new().timeout_seconds(config.billing.timeout_seconds),
    )
    .map_err(|e| anyhow::anyhow!("{}", e))?;

    let mailer = ApiMailer::new(ApiMailerConfig {
        base_url: config.email.api_base_url.clone(),
        client_id: config.email.client_id.clone(),
        client_secret: config.email.client_secret.clone(),
        sender_name: config.email.sender_name.clone(),
        sender_address: config.email.sender_address.clone(),
        timeout_seconds: 10,
    })
    .map_err(|e| anyhow::anyhow!("{}", e))?;

    let catalog = PlanCatalog::new(
        config.billing.monthly_price_id.clone(),
        config.billing.yearly_price_id.clone(),
    )
    .with_free_limits(config.free_tier);

    let checkout_config = CheckoutConfig::from_client_url(&config.client_url);
    checkout_config
        .validate()
        .map_err(|e| anyhow::anyhow!("{}", e))?;

    let context = AppContext::builder()
        .with_accounts(Arc::new(billing_store.clone()))
        .with_entitlements(Arc::new(billing_store))
        .with_travel(Arc::new(travel_store))
        .with_billing_client(Arc::new(billing_client))
        .with_mailer(Arc::new(mailer))
        .with_catalog(catalog)
        .with_checkout_config(checkout_config)
        .with_webhook_secret(config.billing.webhook_secret.clone())
        .with_jwt_secret(config.jwt.access_token_secret.clone())
        .build()?;

    let addr = config.server.addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "trekmate listening");

    axum::serve(listener, context.into_router()).await?;
    Ok(())
}
