use axum::{Extension, Router, extract::State, http::StatusCode, routing::post};

use crate::adapters::http::{app_state::AppState, middleware::Identity};

pub fn router() -> Router<AppState> {
    Router::new().route("/logout", post(logout))
}

/// Forget the caller's entitlement session. The identity token itself is
/// owned by the identity provider.
async fn logout(
    State(app_state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> StatusCode {
    let ended = app_state.sessions.end_session(identity.account.id).await;
    tracing::debug!(account_id = %identity.account.id, ended, "Logout");
    StatusCode::NO_CONTENT
}
