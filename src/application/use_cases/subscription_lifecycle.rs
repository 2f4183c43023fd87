use std::{future::Future, sync::Arc};
use tracing::instrument;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::billing_oracle::{
            BillingOraclePort, CheckoutCustomer, CheckoutRequest, SubscriptionId,
        },
        use_cases::entitlement::{
            EntitlementUseCases, ResolverTimeouts, SubscriptionCacheRepo, TrialPolicyRepo,
            with_cache_timeout,
        },
    },
    domain::entities::{
        account::Account,
        entitlement::EntitlementDecision,
        subscription::{SubscriptionRecord, SubscriptionStatus},
    },
};

/// Where the hosted checkout sends the browser afterwards.
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub success_url: String,
    pub cancel_url: String,
}

impl CheckoutUrls {
    pub fn for_origin(origin: &str) -> Self {
        let origin = origin.trim_end_matches('/');
        Self {
            success_url: format!("{origin}/billing/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{origin}/billing/canceled"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutOutcome {
    /// The account already pays; no checkout was started.
    AlreadySubscribed,
    Redirect(String),
}

#[derive(Clone)]
pub struct SubscriptionLifecycleUseCases {
    entitlements: EntitlementUseCases,
    cache: Arc<dyn SubscriptionCacheRepo>,
    trial_policy: Arc<dyn TrialPolicyRepo>,
    oracle: Arc<dyn BillingOraclePort>,
    urls: CheckoutUrls,
    timeouts: ResolverTimeouts,
}

impl SubscriptionLifecycleUseCases {
    pub fn new(
        entitlements: EntitlementUseCases,
        cache: Arc<dyn SubscriptionCacheRepo>,
        trial_policy: Arc<dyn TrialPolicyRepo>,
        oracle: Arc<dyn BillingOraclePort>,
        urls: CheckoutUrls,
        timeouts: ResolverTimeouts,
    ) -> Self {
        Self {
            entitlements,
            cache,
            trial_policy,
            oracle,
            urls,
            timeouts,
        }
    }

    pub fn entitlements(&self) -> &EntitlementUseCases {
        &self.entitlements
    }

    /// Start a hosted checkout unless the account already has a paid
    /// subscription.
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn create_subscription(
        &self,
        account: &Account,
        with_trial: bool,
    ) -> AppResult<CheckoutOutcome> {
        let decision = self.entitlements.resolve(account).await;
        if decision.has_access && decision.status == SubscriptionStatus::Active {
            tracing::info!("Account already subscribed, skipping checkout");
            return Ok(CheckoutOutcome::AlreadySubscribed);
        }

        let customer = match self
            .provider_call(self.oracle.find_customer_by_email(&account.email))
            .await?
        {
            Some(customer_id) => CheckoutCustomer::Existing(customer_id),
            None => CheckoutCustomer::Email(account.email.clone()),
        };

        let trial_days = if with_trial {
            let days = self.trial_policy.get_default_trial_days().await?;
            (days > 0).then_some(days)
        } else {
            None
        };

        let request = CheckoutRequest {
            customer,
            account_id: account.id,
            trial_days,
            success_url: self.urls.success_url.clone(),
            cancel_url: self.urls.cancel_url.clone(),
        };
        let url = self
            .provider_call(self.oracle.create_checkout_session(&request))
            .await?;

        tracing::info!(trial_days = ?trial_days, "Checkout session created");
        Ok(CheckoutOutcome::Redirect(url))
    }

    /// Cancel the account's running subscription or trial and return the
    /// entitlement that results.
    ///
    /// Paid subscriptions stay usable until the end of the period; trials
    /// end immediately. Nothing is written locally when the provider refuses.
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn cancel_subscription(&self, account: &Account) -> AppResult<EntitlementDecision> {
        let record = with_cache_timeout(self.timeouts.cache, self.cache.get_by_account(account.id))
            .await?
            .ok_or(AppError::NotFound)?;

        if record.admin_override {
            return Err(AppError::InvalidInput(
                "Subscription is managed by an administrator".into(),
            ));
        }
        if !record.status.is_cancellable() {
            return Err(AppError::InvalidInput(format!(
                "Cannot cancel a subscription in status {}",
                record.status
            )));
        }

        let updated = match record.billing_subscription_id.as_deref() {
            Some(subscription_id) => {
                let at_period_end = record.status == SubscriptionStatus::Active;
                let result = self
                    .provider_call(
                        self.oracle
                            .cancel_subscription(&SubscriptionId::new(subscription_id), at_period_end),
                    )
                    .await?;
                SubscriptionRecord {
                    cancel_at: result.cancel_at,
                    ..record.with_status(result.status)
                }
            }
            None => record.with_status(SubscriptionStatus::Canceled),
        };

        with_cache_timeout(self.timeouts.cache, self.cache.upsert(&updated))
            .await
            .map_err(|e| AppError::CacheWriteFailed(e.to_string()))?;
        tracing::info!(
            status = %updated.status,
            cancel_at = ?updated.cancel_at,
            "Subscription canceled"
        );

        Ok(self.entitlements.resolve(account).await)
    }

    pub async fn sync(&self, account: &Account) -> EntitlementDecision {
        self.entitlements.sync(account).await
    }

    async fn provider_call<T>(&self, call: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        match tokio::time::timeout(self.timeouts.oracle, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Billing provider rejected lifecycle operation");
                Err(AppError::LifecycleOperationFailed(e.to_string()))
            }
            Err(_) => Err(AppError::LifecycleOperationFailed(
                "Billing provider timed out".into(),
            )),
        }
    }
}
