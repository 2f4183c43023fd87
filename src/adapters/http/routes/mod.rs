pub mod admin;
pub mod entitlement;
pub mod session;
pub mod subscription;

use axum::Router;

use crate::adapters::http::app_state::AppState;

/// Every route here expects an `Identity` extension, installed by the
/// identity middleware.
pub fn router() -> Router<AppState> {
    Router::new()
        .nest("/entitlement", entitlement::router())
        .nest("/subscription", subscription::router())
        .nest("/session", session::router())
        .nest("/admin", admin::router())
}
