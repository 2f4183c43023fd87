use axum::{
    Extension, Json, Router, extract::State, response::IntoResponse, routing::post,
};
use serde::{Deserialize, Serialize};

use crate::{
    adapters::http::{app_state::AppState, middleware::Identity},
    app_error::AppResult,
    application::session::AccessSnapshot,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(create_checkout))
        .route("/cancel", post(cancel_subscription))
        .route("/sync", post(sync_subscription))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutPayload {
    #[serde(default)]
    with_trial: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutResponse {
    /// `None` when the account is already subscribed.
    checkout_url: Option<String>,
}

async fn create_checkout(
    State(app_state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<CheckoutPayload>,
) -> AppResult<impl IntoResponse> {
    let client = app_state.sessions.client_for(&identity.account).await;
    let checkout_url = client.create_subscription(payload.with_trial).await?;
    Ok(Json(CheckoutResponse { checkout_url }))
}

#[derive(Serialize)]
struct CancelResponse {
    success: bool,
    access: AccessSnapshot,
}

async fn cancel_subscription(
    State(app_state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> impl IntoResponse {
    let client = app_state.sessions.client_for(&identity.account).await;
    let success = client.cancel_subscription().await;
    let access = client.access().await;
    Json(CancelResponse { success, access })
}

/// Called when the browser returns from checkout.
async fn sync_subscription(
    State(app_state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> impl IntoResponse {
    let client = app_state.sessions.client_for(&identity.account).await;
    Json(client.sync().await)
}
