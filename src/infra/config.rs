use std::{net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use url::Url;

use crate::infra::error::InfraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingProvider {
    Stripe,
    /// In-memory provider for local development.
    Dummy,
}

impl FromStr for BillingProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stripe" => Ok(BillingProvider::Stripe),
            "dummy" => Ok(BillingProvider::Dummy),
            _ => Err(format!("Unknown billing provider: {}", s)),
        }
    }
}

pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub jwt_secret: SecretString,
    /// Public origin of the web app; checkout redirects land here.
    pub app_origin: Url,
    pub cors_origin: HeaderValue,
    pub billing_provider: BillingProvider,
    pub stripe_secret_key: Option<SecretString>,
    pub stripe_price_id: Option<String>,
    /// Upper bound for each billing provider call during resolution.
    pub oracle_timeout: Duration,
    pub cache_timeout: Duration,
    /// Seeds the trial policy on first start. Later changes go through the
    /// admin API.
    pub default_trial_days: u32,
    pub log_json_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, InfraError> {
        let database_url: String = get_env("DATABASE_URL");
        let bind_addr: SocketAddr =
            get_env_default("BIND_ADDR", SocketAddr::from(([127, 0, 0, 1], 3001)));
        let jwt_secret = SecretString::new(get_env::<String>("JWT_SECRET").into());
        let app_origin: Url = get_env("APP_ORIGIN");

        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .map_err(|_| InfraError::ConfigInvalid {
                    var: "CORS_ORIGIN",
                    reason: "not a valid header value".into(),
                })?;

        let billing_provider: BillingProvider =
            get_env_default::<String>("BILLING_PROVIDER", "stripe".into())
                .parse()
                .map_err(|reason| InfraError::ConfigInvalid {
                    var: "BILLING_PROVIDER",
                    reason,
                })?;

        let stripe_secret_key = std::env::var("STRIPE_SECRET_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .map(|s| SecretString::new(s.into()));
        let stripe_price_id = std::env::var("STRIPE_PRICE_ID")
            .ok()
            .filter(|s| !s.is_empty());

        if billing_provider == BillingProvider::Stripe {
            if stripe_secret_key.is_none() {
                return Err(InfraError::ConfigMissing {
                    var: "STRIPE_SECRET_KEY",
                });
            }
            if stripe_price_id.is_none() {
                return Err(InfraError::ConfigMissing {
                    var: "STRIPE_PRICE_ID",
                });
            }
        }

        let oracle_timeout_ms: u64 = get_env_default("ORACLE_TIMEOUT_MS", 5_000);
        let cache_timeout_ms: u64 = get_env_default("CACHE_TIMEOUT_MS", 3_000);
        let default_trial_days: u32 = get_env_default("DEFAULT_TRIAL_DAYS", 14);
        let log_json_path = std::env::var("LOG_JSON_PATH")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            database_url,
            bind_addr,
            jwt_secret,
            app_origin,
            cors_origin,
            billing_provider,
            stripe_secret_key,
            stripe_price_id,
            oracle_timeout: Duration::from_millis(oracle_timeout_ms),
            cache_timeout: Duration::from_millis(cache_timeout_ms),
            default_trial_days,
            log_json_path,
        })
    }
}
