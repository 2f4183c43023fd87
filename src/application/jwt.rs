use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app_error::{AppError, AppResult};
use crate::domain::entities::account::Account;
use secrecy::ExposeSecret;

pub const ADMIN_ROLE: &str = "admin";

// ============================================================================
// Identity Claims
// ============================================================================

/// Claims issued by the identity provider for a signed-in account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityClaims {
    pub sub: String,
    pub email: String,
    /// Account creation time, epoch seconds.
    pub created_at: i64,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: i64,
    pub iat: i64,
}

impl IdentityClaims {
    pub fn account(&self) -> AppResult<Account> {
        let id = Uuid::parse_str(&self.sub).map_err(|_| AppError::IdentityMissing)?;
        let created_at =
            DateTime::<Utc>::from_timestamp(self.created_at, 0).ok_or(AppError::IdentityMissing)?;
        Ok(Account::new(id, self.email.clone(), created_at))
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(|r| r == ADMIN_ROLE)
    }
}

pub fn issue(
    account: &Account,
    roles: Vec<String>,
    secret: &secrecy::SecretString,
    ttl: Duration,
) -> AppResult<String> {
    let now = Utc::now().timestamp();
    let claims = IdentityClaims {
        sub: account.id.to_string(),
        email: account.email.clone(),
        created_at: account.created_at.timestamp(),
        roles,
        iat: now,
        exp: now + ttl.num_seconds(),
    };
    let header = Header::new(Algorithm::HS256);
    encode(
        &header,
        &claims,
        &EncodingKey::from_secret(secret.expose_secret().as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.to_string()))
}

pub fn verify(token: &str, secret: &secrecy::SecretString) -> AppResult<IdentityClaims> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<IdentityClaims>(
        token,
        &DecodingKey::from_secret(secret.expose_secret().as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = %e, "Rejected identity token");
        AppError::IdentityMissing
    })
}
