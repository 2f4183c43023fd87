use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::{app_error::AppResult, domain::entities::subscription::SubscriptionStatus};

// ============================================================================
// Port Types - Provider-agnostic billing types
// ============================================================================

/// Unique identifier for a customer in the billing provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a subscription in the billing provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Provider-side subscription, already mapped out of the provider's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingSubscription {
    pub id: SubscriptionId,
    pub customer_id: CustomerId,
    pub status: SubscriptionStatus,
    pub current_period_end: DateTime<Utc>,
    pub trial_end: Option<DateTime<Utc>>,
    pub cancel_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Who a checkout session is for. An existing provider customer is reused;
/// otherwise the provider creates one from the email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutCustomer {
    Existing(CustomerId),
    Email(String),
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub customer: CheckoutCustomer,
    pub account_id: Uuid,
    /// Trial days to attach to the new subscription, if any.
    pub trial_days: Option<u32>,
    pub success_url: String,
    pub cancel_url: String,
}

/// Result of asking the provider to cancel a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancellationResult {
    pub status: SubscriptionStatus,
    /// Scheduled end of access when cancellation was deferred.
    pub cancel_at: Option<DateTime<Utc>>,
}

// ============================================================================
// Billing Oracle Port
// ============================================================================

/// The external billing provider, treated as the authoritative source of
/// subscription truth.
///
/// Implementations report every transport or provider fault as
/// `AppError::OracleUnavailable`.
#[async_trait]
pub trait BillingOraclePort: Send + Sync {
    /// Look up the provider customer registered under an email.
    async fn find_customer_by_email(&self, email: &str) -> AppResult<Option<CustomerId>>;

    /// Subscriptions for a customer that the provider currently considers live
    /// (`active` or `trialing`).
    async fn list_active_subscriptions(
        &self,
        customer_id: &CustomerId,
    ) -> AppResult<Vec<BillingSubscription>>;

    /// Start a hosted checkout and return the URL to redirect to.
    async fn create_checkout_session(&self, request: &CheckoutRequest) -> AppResult<String>;

    /// Cancel a subscription now, or at the end of its current period.
    async fn cancel_subscription(
        &self,
        subscription_id: &SubscriptionId,
        at_period_end: bool,
    ) -> AppResult<CancellationResult>;
}
