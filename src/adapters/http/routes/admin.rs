use axum::{
    Extension, Json, Router,
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, put},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    adapters::http::{app_state::AppState, middleware::Identity},
    app_error::AppResult,
    domain::entities::subscription::{SubscriptionRecord, SubscriptionStatus},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts/{account_id}/override", put(set_override))
        .route(
            "/trial-policy",
            get(get_trial_policy).put(update_trial_policy),
        )
        .route("/subscriptions", get(list_subscriptions))
}

// ============================================================================
// Overrides
// ============================================================================

#[derive(Debug, Deserialize)]
struct OverridePayload {
    /// `null` releases the override.
    status: Option<SubscriptionStatus>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionRecordResponse {
    account_id: Uuid,
    status: SubscriptionStatus,
    billing_subscription_id: Option<String>,
    billing_customer_id: Option<String>,
    current_period_end: Option<DateTime<Utc>>,
    trial_end_date: Option<DateTime<Utc>>,
    cancel_at: Option<DateTime<Utc>>,
    admin_override: bool,
}

impl From<SubscriptionRecord> for SubscriptionRecordResponse {
    fn from(record: SubscriptionRecord) -> Self {
        Self {
            account_id: record.account_id,
            status: record.status,
            billing_subscription_id: record.billing_subscription_id,
            billing_customer_id: record.billing_customer_id,
            current_period_end: record.current_period_end,
            trial_end_date: record.trial_end_date,
            cancel_at: record.cancel_at,
            admin_override: record.admin_override,
        }
    }
}

async fn set_override(
    State(app_state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(account_id): Path<Uuid>,
    Json(payload): Json<OverridePayload>,
) -> AppResult<impl IntoResponse> {
    identity.require_admin()?;

    let record = app_state
        .entitlement_use_cases
        .set_override(account_id, payload.status)
        .await?;
    app_state.sessions.invalidate(account_id).await;

    tracing::info!(
        admin_id = %identity.account.id,
        account_id = %account_id,
        status = ?payload.status,
        "Override applied"
    );
    Ok(Json(SubscriptionRecordResponse::from(record)))
}

// ============================================================================
// Trial Policy
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrialPolicyBody {
    default_trial_days: i64,
}

async fn get_trial_policy(
    State(app_state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> AppResult<impl IntoResponse> {
    identity.require_admin()?;
    let days = app_state.entitlement_use_cases.get_default_trial_days().await?;
    Ok(Json(TrialPolicyBody {
        default_trial_days: i64::from(days),
    }))
}

async fn update_trial_policy(
    State(app_state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(payload): Json<TrialPolicyBody>,
) -> AppResult<impl IntoResponse> {
    identity.require_admin()?;
    let days = app_state
        .entitlement_use_cases
        .set_default_trial_days(payload.default_trial_days)
        .await?;
    Ok(Json(TrialPolicyBody {
        default_trial_days: i64::from(days),
    }))
}

// ============================================================================
// Listing
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: SubscriptionStatus,
}

async fn list_subscriptions(
    State(app_state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    identity.require_admin()?;
    let records = app_state
        .entitlement_use_cases
        .list_by_status(query.status)
        .await?;
    Ok(Json(
        records
            .into_iter()
            .map(SubscriptionRecordResponse::from)
            .collect::<Vec<_>>(),
    ))
}
