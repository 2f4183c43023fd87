use std::sync::Arc;

use crate::{
    application::{
        session::SessionRegistry,
        use_cases::{
            entitlement::EntitlementUseCases, subscription_lifecycle::SubscriptionLifecycleUseCases,
        },
    },
    infra::config::AppConfig,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub entitlement_use_cases: Arc<EntitlementUseCases>,
    pub lifecycle_use_cases: Arc<SubscriptionLifecycleUseCases>,
    pub sessions: Arc<SessionRegistry>,
}
