//! Outbound email.
//!
//! Two backends: [`ConsoleMailer`] for development and [`ApiMailer`]
//! for the HTTP mail provider. Delivery is always best-effort from the
//! caller's perspective; workflow operations log failures and move on.

mod api;
mod console;

pub use api::{ApiMailer, ApiMailerConfig, TokenCache};
pub use console::ConsoleMailer;

use async_trait::async_trait;

use crate::error::Result;

/// An email to deliver.
#[derive(Debug, Clone)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl Email {
    #[must_use]
    pub fn new(
        to: impl Into<String>,
        subject: impl Into<String>,
        html: impl Into<String>,
    ) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html: html.into(),
        }
    }
}

/// Trait for email delivery backends.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<()>;
}
