//! Trekmate - backend for a travel-companion matching service.
//!
//! Accounts publish travel plan listings, other accounts send join
//! requests, and a paid subscription lifts the free-tier listing quota.
//! The two subsystems with real consistency concerns are:
//!
//! - [`billing`]: keeps the local entitlement record reconciled with the
//!   external billing authority across duplicated, out-of-order
//!   notifications and a racing client-side confirmation path.
//! - [`travel`]: the join-request workflow, which enforces request
//!   uniqueness and a hard occupancy ceiling under concurrent approvals.
//!
//! All durable state sits behind storage traits with in-memory
//! implementations for tests and SeaORM implementations (feature
//! `database`) for production.

pub mod accounts;
pub mod app;
pub mod billing;
pub mod config;
pub mod email;
mod error;
pub mod http;
pub mod routes;
pub mod travel;

pub use app::{AppContext, AppContextBuilder};
pub use config::{Config, ConfigBuilder};
pub use error::{AppError, Result};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with sensible defaults.
///
/// Call early in `main()`. Honors `RUST_LOG` for filtering and
/// `LOG_JSON=true` for JSON output.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json_logs = std::env::var("LOG_JSON")
        .map(|v| v.parse::<bool>().unwrap_or(false))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Initialize tracing from a loaded [`Config`].
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::new(&config.logging.level);

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
