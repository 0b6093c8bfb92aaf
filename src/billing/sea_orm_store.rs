//! SeaORM-backed entitlement and account storage.
//!
//! The upsert and the conditional updates are single statements (or one
//! transaction), never read-then-write pairs, because they are the
//! idempotency mechanism for duplicated and racing notifications.

use async_trait::async_trait;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set, TransactionTrait,
    sea_query::Expr, sea_query::OnConflict,
};

use super::plans::PlanTier;
use super::storage::{EntitlementRecord, EntitlementStatus, EntitlementStore};
use crate::accounts::{Account, AccountStore, Role};
use crate::error::{AppError, Result};

// =============================================================================
// Entities
// =============================================================================

mod entity {
    use sea_orm::entity::prelude::*;

    pub mod account {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "accounts")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: String,
            pub email: String,
            pub full_name: String,
            pub role: String,
            pub premium_badge: bool,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod entitlement {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "entitlements")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub account_id: String,
            pub plan: String,
            pub status: String,
            pub customer_ref: String,
            #[sea_orm(unique)]
            pub subscription_ref: String,
            pub start_date: DateTimeWithTimeZone,
            pub end_date: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod billing_customer {
        use super::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "billing_customers")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub account_id: String,
            pub customer_ref: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::{account, billing_customer, entitlement};

// =============================================================================
// Conversions
// =============================================================================

fn parse_status(value: &str) -> EntitlementStatus {
    match value {
        "ACTIVE" => EntitlementStatus::Active,
        _ => EntitlementStatus::Expired,
    }
}

fn model_to_record(model: entitlement::Model) -> Result<EntitlementRecord> {
    Ok(EntitlementRecord {
        plan: PlanTier::parse(&model.plan)
            .map_err(|_| AppError::Database(format!("unknown stored plan: {}", model.plan)))?,
        status: parse_status(&model.status),
        account_id: model.account_id,
        customer_ref: model.customer_ref,
        subscription_ref: model.subscription_ref,
        start_date: model.start_date.with_timezone(&chrono::Utc),
        end_date: model.end_date.with_timezone(&chrono::Utc),
    })
}

fn record_to_active_model(record: &EntitlementRecord) -> entitlement::ActiveModel {
    entitlement::ActiveModel {
        account_id: Set(record.account_id.clone()),
        plan: Set(record.plan.as_str().to_string()),
        status: Set(record.status.as_str().to_string()),
        customer_ref: Set(record.customer_ref.clone()),
        subscription_ref: Set(record.subscription_ref.clone()),
        start_date: Set(record.start_date.fixed_offset()),
        end_date: Set(record.end_date.fixed_offset()),
    }
}

fn model_to_account(model: account::Model) -> Account {
    Account {
        role: Role::parse(&model.role).unwrap_or(Role::User),
        id: model.id,
        email: model.email,
        full_name: model.full_name,
        premium_badge: model.premium_badge,
    }
}

// =============================================================================
// SeaOrmBillingStore
// =============================================================================

/// SeaORM-backed store for entitlements, billing customers, and the
/// account fields the billing subsystem touches.
#[derive(Clone, Debug)]
pub struct SeaOrmBillingStore {
    db: DatabaseConnection,
}

impl SeaOrmBillingStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }
}

#[async_trait]
impl EntitlementStore for SeaOrmBillingStore {
    async fn get(&self, account_id: &str) -> Result<Option<EntitlementRecord>> {
        let model = entitlement::Entity::find_by_id(account_id)
            .one(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        model.map(model_to_record).transpose()
    }

    async fn get_by_subscription_ref(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<EntitlementRecord>> {
        let model = entitlement::Entity::find()
            .filter(entitlement::Column::SubscriptionRef.eq(subscription_ref))
            .one(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        model.map(model_to_record).transpose()
    }

    async fn upsert(&self, record: &EntitlementRecord) -> Result<()> {
        tracing::debug!(
            target: "trekmate::billing::store",
            account_id = %record.account_id,
            subscription_ref = %record.subscription_ref,
            status = %record.status,
            "upserting entitlement"
        );

        entitlement::Entity::insert(record_to_active_model(record))
            .on_conflict(
                OnConflict::column(entitlement::Column::AccountId)
                    .update_columns([
                        entitlement::Column::Plan,
                        entitlement::Column::Status,
                        entitlement::Column::CustomerRef,
                        entitlement::Column::SubscriptionRef,
                        entitlement::Column::StartDate,
                        entitlement::Column::EndDate,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn set_status_by_subscription_ref(
        &self,
        subscription_ref: &str,
        status: EntitlementStatus,
    ) -> Result<Option<EntitlementRecord>> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let updated = entitlement::Entity::update_many()
            .col_expr(entitlement::Column::Status, Expr::value(status.as_str()))
            .filter(entitlement::Column::SubscriptionRef.eq(subscription_ref))
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if updated.rows_affected == 0 {
            txn.commit()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Ok(None);
        }

        let model = entitlement::Entity::find()
            .filter(entitlement::Column::SubscriptionRef.eq(subscription_ref))
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        model.map(model_to_record).transpose()
    }

    async fn delete_by_subscription_ref(
        &self,
        subscription_ref: &str,
    ) -> Result<Option<EntitlementRecord>> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let model = entitlement::Entity::find()
            .filter(entitlement::Column::SubscriptionRef.eq(subscription_ref))
            .one(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let Some(model) = model else {
            txn.commit()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
            return Ok(None);
        };

        entitlement::Entity::delete_by_id(model.account_id.clone())
            .exec(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        model_to_record(model).map(Some)
    }

    async fn customer_ref(&self, account_id: &str) -> Result<Option<String>> {
        let model = billing_customer::Entity::find_by_id(account_id)
            .one(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(model.map(|m| m.customer_ref))
    }

    async fn set_customer_ref(&self, account_id: &str, customer_ref: &str) -> Result<()> {
        let model = billing_customer::ActiveModel {
            account_id: Set(account_id.to_string()),
            customer_ref: Set(customer_ref.to_string()),
        };

        billing_customer::Entity::insert(model)
            .on_conflict(
                OnConflict::column(billing_customer::Column::AccountId)
                    .update_columns([billing_customer::Column::CustomerRef])
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for SeaOrmBillingStore {
    async fn find(&self, account_id: &str) -> Result<Option<Account>> {
        let model = account::Entity::find_by_id(account_id)
            .one(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(model.map(model_to_account))
    }

    async fn set_premium_badge(&self, account_id: &str, premium: bool) -> Result<bool> {
        let updated = account::Entity::update_many()
            .col_expr(account::Column::PremiumBadge, Expr::value(premium))
            .filter(account::Column::Id.eq(account_id))
            .exec(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(updated.rows_affected > 0)
    }
}
