//! Accounts as the billing and workflow subsystems see them.
//!
//! Profile CRUD lives elsewhere; this module only carries the fields the
//! core needs: identity, role, email for customer creation, and the
//! premium badge that mirrors an active paid entitlement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "USER" => Some(Self::User),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "USER",
            Self::Admin => "ADMIN",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    /// Mirrors an active paid entitlement. Set and cleared by the
    /// reconciler; never toggled.
    pub premium_badge: bool,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find(&self, account_id: &str) -> Result<Option<Account>>;

    /// Set the premium badge to an absolute value. Setting it to the
    /// value it already has is a no-op, which is what makes replayed
    /// grant notifications harmless. Returns `false` when the account
    /// does not exist.
    async fn set_premium_badge(&self, account_id: &str, premium: bool) -> Result<bool>;
}

/// In-memory account store for development and tests.
#[derive(Default, Clone)]
pub struct InMemoryAccountStore {
    inner: std::sync::Arc<std::sync::RwLock<std::collections::HashMap<String, Account>>>,
}

impl InMemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, account: Account) {
        self.inner
            .write()
            .unwrap()
            .insert(account.id.clone(), account);
    }

    /// Convenience used all over the tests.
    pub fn seed(&self, id: &str, role: Role) -> Account {
        let account = Account {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            full_name: id.replace('_', " "),
            role,
            premium_badge: false,
        };
        self.insert(account.clone());
        account
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find(&self, account_id: &str) -> Result<Option<Account>> {
        Ok(self.inner.read().unwrap().get(account_id).cloned())
    }

    async fn set_premium_badge(&self, account_id: &str, premium: bool) -> Result<bool> {
        let mut accounts = self.inner.write().unwrap();
        match accounts.get_mut(account_id) {
            Some(account) => {
                account.premium_badge = premium;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
