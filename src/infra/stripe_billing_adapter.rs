use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use secrecy::SecretString;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::billing_oracle::{
        BillingOraclePort, BillingSubscription, CancellationResult, CheckoutCustomer,
        CheckoutRequest, CustomerId, SubscriptionId,
    },
    domain::entities::subscription::SubscriptionStatus,
    infra::stripe_client::{CheckoutSessionParams, StripeClient, StripeSubscription},
};

/// Adapter that wraps `StripeClient` to implement `BillingOraclePort`.
#[derive(Clone)]
pub struct StripeBillingAdapter {
    client: StripeClient,
    price_id: String,
}

impl StripeBillingAdapter {
    pub fn new(secret_key: SecretString, price_id: String) -> Self {
        Self {
            client: StripeClient::new(secret_key),
            price_id,
        }
    }

    fn timestamp_to_datetime(ts: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(ts, 0).single()
    }

    /// Map a Stripe subscription into the port type. Subscriptions without a
    /// usable period end cannot be reasoned about and are dropped.
    fn to_billing_subscription(sub: &StripeSubscription) -> Option<BillingSubscription> {
        let Some(current_period_end) = sub.period_end().and_then(Self::timestamp_to_datetime)
        else {
            tracing::warn!(subscription_id = %sub.id, "Stripe subscription without period end");
            return None;
        };

        Some(BillingSubscription {
            id: SubscriptionId::new(&sub.id),
            customer_id: CustomerId::new(&sub.customer),
            status: SubscriptionStatus::from_provider(&sub.status),
            current_period_end,
            trial_end: sub.trial_end.and_then(Self::timestamp_to_datetime),
            cancel_at: Self::effective_cancel_at(sub).and_then(Self::timestamp_to_datetime),
            created_at: Self::timestamp_to_datetime(sub.created).unwrap_or(current_period_end),
        })
    }

    /// Stripe leaves `cancel_at` empty for cancellations scheduled at the
    /// period end.
    fn effective_cancel_at(sub: &StripeSubscription) -> Option<i64> {
        if sub.cancel_at_period_end {
            sub.cancel_at.or_else(|| sub.period_end())
        } else {
            sub.cancel_at
        }
    }

    fn to_cancellation(sub: &StripeSubscription) -> CancellationResult {
        CancellationResult {
            status: SubscriptionStatus::from_provider(&sub.status),
            cancel_at: Self::effective_cancel_at(sub).and_then(Self::timestamp_to_datetime),
        }
    }
}

#[async_trait]
impl BillingOraclePort for StripeBillingAdapter {
    async fn find_customer_by_email(&self, email: &str) -> AppResult<Option<CustomerId>> {
        let customer = self.client.find_customer_by_email(email).await?;
        Ok(customer.map(|c| CustomerId::new(c.id)))
    }

    async fn list_active_subscriptions(
        &self,
        customer_id: &CustomerId,
    ) -> AppResult<Vec<BillingSubscription>> {
        let subscriptions = self.client.list_subscriptions(customer_id.as_str()).await?;
        Ok(subscriptions
            .iter()
            .filter_map(Self::to_billing_subscription)
            .filter(|s| s.status.grants_access())
            .collect())
    }

    async fn create_checkout_session(&self, request: &CheckoutRequest) -> AppResult<String> {
        let (customer_id, customer_email) = match &request.customer {
            CheckoutCustomer::Existing(id) => (Some(id.as_str()), None),
            CheckoutCustomer::Email(email) => (None, Some(email.as_str())),
        };
        let account_ref = request.account_id.to_string();

        let session = self
            .client
            .create_checkout_session(&CheckoutSessionParams {
                customer_id,
                customer_email,
                price_id: &self.price_id,
                success_url: &request.success_url,
                cancel_url: &request.cancel_url,
                client_reference_id: &account_ref,
                trial_days: request.trial_days,
            })
            .await?;

        tracing::debug!(session_id = %session.id, "Stripe checkout session created");
        session
            .url
            .ok_or_else(|| AppError::OracleUnavailable("Checkout session has no URL".into()))
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &SubscriptionId,
        at_period_end: bool,
    ) -> AppResult<CancellationResult> {
        let sub = self
            .client
            .cancel_subscription(subscription_id.as_str(), at_period_end)
            .await?;
        Ok(Self::to_cancellation(&sub))
    }
}
