//! Inert regional payment gateway.
//!
//! The service once targeted SSLCommerz for local-currency payments.
//! Card checkout replaced it, but the seam is kept so a future regional
//! rollout has somewhere to land; every operation returns a typed
//! not-implemented error instead of silently doing nothing.

use serde::{Deserialize, Serialize};

use super::error::BillingError;
use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyPaymentRequest {
    pub account_id: String,
    pub amount_cents: i64,
    pub currency: String,
}

#[derive(Debug, Default, Clone)]
pub struct LegacyGateway;

impl LegacyGateway {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    pub async fn init_payment(&self, _request: LegacyPaymentRequest) -> Result<()> {
        Err(BillingError::PaymentBackendDisabled {
            backend: "SSLCommerz",
        }
        .into())
    }

    pub async fn validate_payment(&self, _transaction_id: &str) -> Result<()> {
        Err(BillingError::PaymentBackendDisabled {
            backend: "SSLCommerz",
        }
        .into())
    }
}
