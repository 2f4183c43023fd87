use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::{
    adapters::http::app_state::AppState,
    app_error::{AppError, AppResult},
    application::jwt::{self, IdentityClaims},
    domain::entities::account::Account,
};

/// Verify the bearer token and make the caller's claims available to
/// handlers as an `Extension<Identity>`.
pub async fn identity_middleware(
    State(app_state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::IdentityMissing)?;

    let claims = jwt::verify(token, &app_state.config.jwt_secret)?;
    let account = claims.account()?;

    tracing::debug!(account_id = %account.id, "Identity verified");
    request.extensions_mut().insert(Identity { claims, account });

    Ok(next.run(request).await)
}

/// The verified caller.
#[derive(Debug, Clone)]
pub struct Identity {
    pub claims: IdentityClaims,
    pub account: Account,
}

impl Identity {
    pub fn require_admin(&self) -> AppResult<()> {
        if self.claims.is_admin() {
            Ok(())
        } else {
            tracing::warn!(account_id = %self.account.id, "Admin route denied");
            Err(AppError::Forbidden)
        }
    }
}
