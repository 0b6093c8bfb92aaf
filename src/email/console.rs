use async_trait::async_trait;

use super::{Email, Mailer};
use crate::error::Result;

/// Mailer that logs instead of delivering. For development and tests.
#[derive(Debug, Default, Clone)]
pub struct ConsoleMailer;

impl ConsoleMailer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        tracing::info!(
            target: "trekmate::email",
            to = %email.to,
            subject = %email.subject,
            "email (console backend, not delivered)"
        );
        Ok(())
    }
}
