//! Route modules.

mod payments;
mod travel;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::app::AppContext;

/// Assemble the full application router.
pub fn router(context: AppContext) -> Router {
    Router::new()
        .merge(payments::routes())
        .nest("/travel-plans", travel::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(context)
}
