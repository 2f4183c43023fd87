use axum::{
    Extension, Json, Router,
    extract::{Query, State},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;

use crate::adapters::http::{app_state::AppState, middleware::Identity};

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_entitlement))
}

#[derive(Debug, Default, Deserialize)]
struct EntitlementQuery {
    #[serde(default)]
    recheck: bool,
}

async fn get_entitlement(
    State(app_state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<EntitlementQuery>,
) -> impl IntoResponse {
    let client = app_state.sessions.client_for(&identity.account).await;
    let snapshot = if query.recheck {
        client.recheck().await
    } else {
        client.access().await
    };
    Json(snapshot)
}
