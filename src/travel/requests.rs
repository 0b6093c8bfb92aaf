//! Join request workflow.
//!
//! Thin orchestration over [`TravelStore`]: the store enforces the
//! invariants atomically, this layer shapes inputs, logs transitions,
//! and fires the best-effort approval notification.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::storage::TravelStore;
use super::types::{JoinRequest, JoinRequestStatus, RequestDecision};
use crate::accounts::AccountStore;
use crate::email::{Email, Mailer};
use crate::error::Result;

#[derive(Clone)]
pub struct TravelRequestManager {
    store: Arc<dyn TravelStore>,
    accounts: Arc<dyn AccountStore>,
    mailer: Arc<dyn Mailer>,
}

impl TravelRequestManager {
    #[must_use]
    pub fn new(
        store: Arc<dyn TravelStore>,
        accounts: Arc<dyn AccountStore>,
        mailer: Arc<dyn Mailer>,
    ) -> Self {
        Self {
            store,
            accounts,
            mailer,
        }
    }

    /// Send a join request for a plan.
    pub async fn send_request(
        &self,
        requester_id: &str,
        plan_id: &str,
        message: Option<String>,
    ) -> Result<JoinRequest> {
        let request = JoinRequest {
            id: Uuid::new_v4().to_string(),
            plan_id: plan_id.to_string(),
            requester_id: requester_id.to_string(),
            message,
            status: JoinRequestStatus::Pending,
            created_at: Utc::now(),
        };

        let created = self.store.create_join_request(&request).await?;
        tracing::info!(
            target: "trekmate::travel",
            request_id = %created.id,
            plan_id = %plan_id,
            requester_id = %requester_id,
            "join request created"
        );
        Ok(created)
    }

    /// Resolve a pending request as the plan owner.
    pub async fn respond(
        &self,
        owner_id: &str,
        request_id: &str,
        decision: RequestDecision,
    ) -> Result<JoinRequest> {
        let resolved = self
            .store
            .resolve_request(request_id, owner_id, decision)
            .await?;

        tracing::info!(
            target: "trekmate::travel",
            request_id = %resolved.id,
            plan_id = %resolved.plan_id,
            status = %resolved.status,
            "join request resolved"
        );

        if resolved.status == JoinRequestStatus::Approved {
            self.notify_approved(&resolved).await;
        }
        Ok(resolved)
    }

    /// Approval notification. Failures are logged, never surfaced; the
    /// approval already committed.
    async fn notify_approved(&self, request: &JoinRequest) {
        let requester = match self.accounts.find(&request.requester_id).await {
            Ok(Some(account)) => account,
            Ok(None) => return,
            Err(err) => {
                tracing::warn!(
                    target: "trekmate::travel",
                    request_id = %request.id,
                    error = %err,
                    "could not load requester for notification"
                );
                return;
            }
        };

        let plan_name = match self.store.find_plan(&request.plan_id).await {
            Ok(Some(plan)) => plan.title,
            _ => request.plan_id.clone(),
        };

        let email = Email::new(
            requester.email,
            "Your travel request was approved",
            format!(
                "<p>Hi {},</p><p>Your request to join <strong>{}</strong> was approved. \
                 Time to pack!</p>",
                requester.full_name, plan_name
            ),
        );
        if let Err(err) = self.mailer.send(&email).await {
            tracing::warn!(
                target: "trekmate::travel",
                request_id = %request.id,
                error = %err,
                "approval notification failed"
            );
        }
    }
}
