use std::{fs::File, path::Path, sync::Arc};

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::http::app_state::AppState,
    application::{
        ports::{billing_oracle::BillingOraclePort, clock::SystemClock},
        session::SessionRegistry,
        use_cases::{
            entitlement::{
                EntitlementUseCases, ResolverTimeouts, SubscriptionCacheRepo, TrialPolicyRepo,
            },
            subscription_lifecycle::{CheckoutUrls, SubscriptionLifecycleUseCases},
        },
    },
    infra::{
        config::{AppConfig, BillingProvider},
        dummy_billing_client::DummyBillingClient,
        error::InfraError,
        postgres_persistence,
        stripe_billing_adapter::StripeBillingAdapter,
    },
};

pub async fn init_app_state() -> anyhow::Result<AppState> {
    let config = AppConfig::from_env()?;

    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);
    postgres_arc
        .seed_trial_policy(config.default_trial_days)
        .await
        .map_err(InfraError::Seed)?;

    let clock = Arc::new(SystemClock);
    let oracle: Arc<dyn BillingOraclePort> = match config.billing_provider {
        BillingProvider::Stripe => {
            let secret_key = config
                .stripe_secret_key
                .clone()
                .ok_or(InfraError::ConfigMissing {
                    var: "STRIPE_SECRET_KEY",
                })?;
            let price_id = config
                .stripe_price_id
                .clone()
                .ok_or(InfraError::ConfigMissing {
                    var: "STRIPE_PRICE_ID",
                })?;
            Arc::new(StripeBillingAdapter::new(secret_key, price_id))
        }
        BillingProvider::Dummy => {
            tracing::warn!("Using the in-memory dummy billing provider");
            Arc::new(DummyBillingClient::new(clock.clone()))
        }
    };

    let cache_arc = postgres_arc.clone() as Arc<dyn SubscriptionCacheRepo>;
    let trial_policy_arc = postgres_arc.clone() as Arc<dyn TrialPolicyRepo>;

    let timeouts = ResolverTimeouts {
        oracle: config.oracle_timeout,
        cache: config.cache_timeout,
    };

    let entitlement_use_cases = EntitlementUseCases::new(
        cache_arc.clone(),
        trial_policy_arc.clone(),
        oracle.clone(),
        clock,
        timeouts,
    );

    let lifecycle_use_cases = SubscriptionLifecycleUseCases::new(
        entitlement_use_cases.clone(),
        cache_arc,
        trial_policy_arc,
        oracle,
        CheckoutUrls::for_origin(config.app_origin.as_str()),
        timeouts,
    );

    let sessions = SessionRegistry::new(lifecycle_use_cases.clone());

    Ok(AppState {
        config: Arc::new(config),
        entitlement_use_cases: Arc::new(entitlement_use_cases),
        lifecycle_use_cases: Arc::new(lifecycle_use_cases),
        sessions: Arc::new(sessions),
    })
}

pub fn init_tracing(log_json_path: Option<&Path>) -> Result<(), InfraError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "entitlement_engine=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer().with_target(false).with_level(true).pretty();

    // File (structured JSON logs), only when a path is configured
    let json_layer = match log_json_path {
        Some(path) => {
            let file = File::create(path).map_err(InfraError::LogFile)?;
            Some(
                fmt::layer()
                    .json()
                    .with_writer(file)
                    .with_current_span(true)
                    .with_span_list(true)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();

    Ok(())
}
