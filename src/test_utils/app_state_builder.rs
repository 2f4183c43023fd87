//! Test app state builder for HTTP-level testing.
//!
//! `TestAppStateBuilder` creates an `AppState` backed by in-memory mocks and a
//! clock frozen at `test_now()`.

use std::{net::SocketAddr, sync::Arc, time::Duration as StdDuration};

use axum::{Router, http::HeaderValue};
use chrono::Duration;
use secrecy::SecretString;
use url::Url;

use crate::{
    adapters::http::app_state::AppState,
    application::{
        jwt,
        ports::billing_oracle::BillingSubscription,
        session::SessionRegistry,
        use_cases::{
            entitlement::{EntitlementUseCases, ResolverTimeouts},
            subscription_lifecycle::{CheckoutUrls, SubscriptionLifecycleUseCases},
        },
    },
    domain::entities::{account::Account, subscription::SubscriptionRecord},
    infra::{
        app::build_router,
        config::{AppConfig, BillingProvider},
    },
    test_utils::{
        FixedClock, InMemorySubscriptionCache, InMemoryTrialPolicy, MockBillingOracle, test_now,
    },
};

const TEST_JWT_SECRET: &str = "test_jwt_secret_with_enough_length";
const TEST_ORIGIN: &str = "http://localhost:3000";

pub struct TestAppStateBuilder {
    trial_days: u32,
    records: Vec<SubscriptionRecord>,
    remote: Vec<(String, BillingSubscription)>,
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppStateBuilder {
    /// Create a builder with a 14 day trial policy and empty stores.
    pub fn new() -> Self {
        Self {
            trial_days: 14,
            records: vec![],
            remote: vec![],
        }
    }

    pub fn with_trial_days(mut self, days: u32) -> Self {
        self.trial_days = days;
        self
    }

    /// Seed the subscription cache.
    pub fn with_record(mut self, record: SubscriptionRecord) -> Self {
        self.records.push(record);
        self
    }

    /// Seed the mock billing provider.
    pub fn with_remote_subscription(mut self, email: &str, subscription: BillingSubscription) -> Self {
        self.remote.push((email.to_string(), subscription));
        self
    }

    pub fn build(self) -> AppState {
        self.build_with_mocks().0
    }

    /// Build the AppState and hand back the cache and billing mocks for
    /// assertions.
    pub fn build_with_mocks(
        self,
    ) -> (AppState, Arc<InMemorySubscriptionCache>, Arc<MockBillingOracle>) {
        let cache = Arc::new(InMemorySubscriptionCache::with_records(self.records));
        let trial_policy = Arc::new(InMemoryTrialPolicy::new(self.trial_days));
        let oracle = Arc::new(MockBillingOracle::new());
        for (email, subscription) in self.remote {
            oracle.add_subscription(&email, subscription);
        }
        let clock = Arc::new(FixedClock::new(test_now()));

        let config = test_config();
        let timeouts = ResolverTimeouts {
            oracle: config.oracle_timeout,
            cache: config.cache_timeout,
        };

        let entitlements = EntitlementUseCases::new(
            cache.clone(),
            trial_policy.clone(),
            oracle.clone(),
            clock,
            timeouts,
        );
        let lifecycle = SubscriptionLifecycleUseCases::new(
            entitlements.clone(),
            cache.clone(),
            trial_policy,
            oracle.clone(),
            CheckoutUrls::for_origin(TEST_ORIGIN),
            timeouts,
        );
        let sessions = SessionRegistry::new(lifecycle.clone());

        let app_state = AppState {
            config: Arc::new(config),
            entitlement_use_cases: Arc::new(entitlements),
            lifecycle_use_cases: Arc::new(lifecycle),
            sessions: Arc::new(sessions),
        };

        (app_state, cache, oracle)
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://localhost/entitlement_test".to_string(),
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        jwt_secret: SecretString::new(TEST_JWT_SECRET.into()),
        app_origin: Url::parse(TEST_ORIGIN).unwrap(),
        cors_origin: HeaderValue::from_static(TEST_ORIGIN),
        billing_provider: BillingProvider::Dummy,
        stripe_secret_key: None,
        stripe_price_id: None,
        oracle_timeout: StdDuration::from_secs(2),
        cache_timeout: StdDuration::from_secs(2),
        default_trial_days: 14,
        log_json_path: None,
    }
}

/// Sign an identity token the way the identity provider would.
pub fn bearer_token(app_state: &AppState, account: &Account, roles: &[&str]) -> String {
    jwt::issue(
        account,
        roles.iter().map(|r| r.to_string()).collect(),
        &app_state.config.jwt_secret,
        Duration::hours(1),
    )
    .unwrap()
}

/// The production router without global tracing setup.
pub fn test_router(app_state: AppState) -> Router {
    build_router(app_state)
}
