use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::{future::Future, sync::Arc, time::Duration as StdDuration};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        billing_oracle::{BillingOraclePort, BillingSubscription},
        clock::Clock,
    },
    domain::entities::{
        account::Account,
        entitlement::EntitlementDecision,
        subscription::{SubscriptionRecord, SubscriptionStatus},
    },
};

// ============================================================================
// Repository Traits
// ============================================================================

/// Durable store holding one `SubscriptionRecord` per account.
///
/// Writes replace the whole record; concurrent writers resolve as last write
/// wins.
#[async_trait]
pub trait SubscriptionCacheRepo: Send + Sync {
    async fn get_by_account(&self, account_id: Uuid) -> AppResult<Option<SubscriptionRecord>>;
    async fn upsert(&self, record: &SubscriptionRecord) -> AppResult<()>;
    async fn list_by_status(
        &self,
        status: SubscriptionStatus,
    ) -> AppResult<Vec<SubscriptionRecord>>;
}

#[async_trait]
pub trait TrialPolicyRepo: Send + Sync {
    async fn get_default_trial_days(&self) -> AppResult<u32>;
    async fn set_default_trial_days(&self, days: u32) -> AppResult<()>;
}

// ============================================================================
// Use Cases
// ============================================================================

/// Upper bounds for the two suspension points of a resolution.
#[derive(Debug, Clone, Copy)]
pub struct ResolverTimeouts {
    pub oracle: StdDuration,
    pub cache: StdDuration,
}

impl Default for ResolverTimeouts {
    fn default() -> Self {
        Self {
            oracle: StdDuration::from_secs(5),
            cache: StdDuration::from_secs(3),
        }
    }
}

/// A decision together with the record that should be cached for it.
type Reconciled = (EntitlementDecision, Option<SubscriptionRecord>);

#[derive(Clone)]
pub struct EntitlementUseCases {
    cache: Arc<dyn SubscriptionCacheRepo>,
    trial_policy: Arc<dyn TrialPolicyRepo>,
    oracle: Arc<dyn BillingOraclePort>,
    clock: Arc<dyn Clock>,
    timeouts: ResolverTimeouts,
}

impl EntitlementUseCases {
    pub fn new(
        cache: Arc<dyn SubscriptionCacheRepo>,
        trial_policy: Arc<dyn TrialPolicyRepo>,
        oracle: Arc<dyn BillingOraclePort>,
        clock: Arc<dyn Clock>,
        timeouts: ResolverTimeouts,
    ) -> Self {
        Self {
            cache,
            trial_policy,
            oracle,
            clock,
            timeouts,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn timeouts(&self) -> ResolverTimeouts {
        self.timeouts
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// Decide whether `account` currently has access.
    ///
    /// Never fails: provider and store faults degrade to the most
    /// conservative decision the available information supports. Local
    /// verdicts that are still valid are returned without contacting the
    /// billing provider.
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn resolve(&self, account: &Account) -> EntitlementDecision {
        let cached = match self.read_cache(account.id).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(error = %e, "Subscription cache unreadable, denying access");
                return EntitlementDecision::no_access();
            }
        };
        let now = self.clock.now();

        let local = cached
            .as_ref()
            .and_then(|record| Self::local_verdict(record, now));
        let (decision, desired) = match local {
            Some(verdict) => verdict,
            None => self.reconcile_remote(account, cached.as_ref(), now).await,
        };

        if let Some(record) = desired {
            self.write_back(cached.as_ref(), record).await;
        }

        tracing::debug!(
            has_access = decision.has_access,
            status = %decision.status,
            trial = decision.is_in_trial_period,
            "Entitlement resolved"
        );
        decision
    }

    /// Reconcile against the billing provider first, ignoring local
    /// verdicts other than an administrative override. Used right after a
    /// checkout completes, when the cache is known to lag the provider.
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn sync(&self, account: &Account) -> EntitlementDecision {
        let cached = match self.read_cache(account.id).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(error = %e, "Subscription cache unreadable, denying access");
                return EntitlementDecision::no_access();
            }
        };
        let now = self.clock.now();

        if let Some(record) = cached.as_ref().filter(|r| r.admin_override) {
            return EntitlementDecision::overridden(record, now);
        }

        let (decision, desired) = match self.lookup_remote(account).await {
            Ok(Some(subscription)) => {
                Self::reconcile_subscription(account, cached.as_ref(), &subscription, now)
            }
            Ok(None) => match cached.as_ref() {
                Some(record) if record.billing_subscription_id.is_some() => {
                    Self::provider_subscription_gone(record, now)
                }
                _ => match cached.as_ref().and_then(|r| Self::local_verdict(r, now)) {
                    Some(verdict) => verdict,
                    None => self.trial_fallback(account, cached.as_ref(), now, true).await,
                },
            },
            Err(e) => {
                tracing::warn!(error = %e, "Billing oracle unavailable during sync");
                match cached.as_ref().and_then(|r| Self::local_verdict(r, now)) {
                    Some(verdict) => verdict,
                    None => self.trial_fallback(account, cached.as_ref(), now, false).await,
                }
            }
        };

        if let Some(record) = desired {
            self.write_back(cached.as_ref(), record).await;
        }
        decision
    }

    /// The provider no longer lists a live subscription for a record that was
    /// created from one.
    fn provider_subscription_gone(record: &SubscriptionRecord, now: DateTime<Utc>) -> Reconciled {
        if !record.status.grants_access() {
            return (EntitlementDecision::denied(record), None);
        }
        let status = if record.cancel_at.is_some_and(|at| at <= now) {
            SubscriptionStatus::Canceled
        } else {
            SubscriptionStatus::Inactive
        };
        tracing::info!(
            subscription_id = ?record.billing_subscription_id,
            status = %status,
            "Provider subscription no longer live"
        );
        let ended = record.with_status(status);
        (EntitlementDecision::denied(&ended), Some(ended))
    }

    /// Local-only fast paths. `None` means the cached record cannot decide on
    /// its own and the provider has to be consulted.
    fn local_verdict(record: &SubscriptionRecord, now: DateTime<Utc>) -> Option<Reconciled> {
        if record.admin_override {
            return Some((EntitlementDecision::overridden(record, now), None));
        }

        match record.status {
            SubscriptionStatus::Trialing => {
                let trial_end = record.trial_end_date?;
                if trial_end <= now {
                    let expired = record.with_status(SubscriptionStatus::Inactive);
                    tracing::info!(trial_end = %trial_end, "Trial expired");
                    Some((EntitlementDecision::denied(&expired), Some(expired)))
                } else {
                    Some((EntitlementDecision::trial(record, trial_end, now), None))
                }
            }
            SubscriptionStatus::Active => {
                let ends_at = record.access_ends_at()?;
                if ends_at <= now {
                    let status = if record.cancel_at.is_some_and(|at| at <= now) {
                        SubscriptionStatus::Canceled
                    } else {
                        SubscriptionStatus::Inactive
                    };
                    let lapsed = record.with_status(status);
                    tracing::info!(ended_at = %ends_at, status = %status, "Paid period ended");
                    Some((EntitlementDecision::denied(&lapsed), Some(lapsed)))
                } else {
                    // Re-applying the status strips any stale trial end.
                    let clean = record.with_status(SubscriptionStatus::Active);
                    Some((EntitlementDecision::paid(&clean), Some(clean)))
                }
            }
            _ => None,
        }
    }

    async fn reconcile_remote(
        &self,
        account: &Account,
        cached: Option<&SubscriptionRecord>,
        now: DateTime<Utc>,
    ) -> Reconciled {
        match self.lookup_remote(account).await {
            Ok(Some(subscription)) => {
                Self::reconcile_subscription(account, cached, &subscription, now)
            }
            Ok(None) => self.trial_fallback(account, cached, now, true).await,
            Err(e) => {
                tracing::warn!(error = %e, "Billing oracle unavailable, using trial policy");
                self.trial_fallback(account, cached, now, false).await
            }
        }
    }

    /// Find the authoritative provider subscription for an account, if any.
    async fn lookup_remote(&self, account: &Account) -> AppResult<Option<BillingSubscription>> {
        let customer = self
            .with_oracle_timeout(self.oracle.find_customer_by_email(&account.email))
            .await?;
        let Some(customer) = customer else {
            tracing::debug!("No billing customer for account");
            return Ok(None);
        };

        let subscriptions = self
            .with_oracle_timeout(self.oracle.list_active_subscriptions(&customer))
            .await?;
        Ok(select_authoritative(subscriptions))
    }

    fn reconcile_subscription(
        account: &Account,
        cached: Option<&SubscriptionRecord>,
        subscription: &BillingSubscription,
        now: DateTime<Utc>,
    ) -> Reconciled {
        let mut record = cached
            .cloned()
            .unwrap_or_else(|| SubscriptionRecord::new(account.id, subscription.status));
        record.billing_subscription_id = Some(subscription.id.as_str().to_string());
        record.billing_customer_id = Some(subscription.customer_id.as_str().to_string());
        record.current_period_end = Some(subscription.current_period_end);
        record.cancel_at = subscription.cancel_at;

        if subscription.status == SubscriptionStatus::Trialing {
            let trial_end = subscription
                .trial_end
                .unwrap_or(subscription.current_period_end);
            record.status = SubscriptionStatus::Trialing;
            record.trial_end_date = Some(trial_end);
            if trial_end <= now {
                let expired = record.with_status(SubscriptionStatus::Inactive);
                return (EntitlementDecision::denied(&expired), Some(expired));
            }
            return (
                EntitlementDecision::trial(&record, trial_end, now),
                Some(record),
            );
        }

        let record = record.with_status(SubscriptionStatus::Active);
        match record.access_ends_at() {
            Some(ends_at) if ends_at <= now => {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    ended_at = %ends_at,
                    "Provider reports an active subscription past its period end"
                );
                let lapsed = record.with_status(SubscriptionStatus::Inactive);
                (EntitlementDecision::denied(&lapsed), Some(lapsed))
            }
            _ => (EntitlementDecision::paid(&record), Some(record)),
        }
    }

    /// Access derived purely from account age and the trial policy.
    ///
    /// `remote_known` is false when the provider could not be reached; in
    /// that case existing records are never downgraded.
    async fn trial_fallback(
        &self,
        account: &Account,
        cached: Option<&SubscriptionRecord>,
        now: DateTime<Utc>,
        remote_known: bool,
    ) -> Reconciled {
        let days = self.default_trial_days().await;
        let trial_end = cached
            .and_then(|r| r.trial_end_date)
            .unwrap_or_else(|| account.created_at + Duration::days(i64::from(days)));
        let eligible = cached.is_none_or(is_trial_eligible);

        if eligible && days > 0 && now < trial_end {
            let record = match cached {
                Some(existing) => SubscriptionRecord {
                    status: SubscriptionStatus::Trialing,
                    trial_end_date: Some(trial_end),
                    ..existing.clone()
                },
                None => SubscriptionRecord::trialing(account.id, trial_end),
            };
            return (
                EntitlementDecision::trial(&record, trial_end, now),
                Some(record),
            );
        }

        match cached {
            Some(existing) if remote_known && existing.status.grants_access() => {
                let lapsed = existing.with_status(SubscriptionStatus::Inactive);
                (EntitlementDecision::denied(&lapsed), Some(lapsed))
            }
            Some(existing) => (EntitlementDecision::denied(existing), None),
            None => {
                let record = SubscriptionRecord {
                    trial_end_date: (days > 0).then_some(trial_end),
                    ..SubscriptionRecord::new(account.id, SubscriptionStatus::Inactive)
                };
                (EntitlementDecision::denied(&record), Some(record))
            }
        }
    }

    async fn default_trial_days(&self) -> u32 {
        match self.trial_policy.get_default_trial_days().await {
            Ok(days) => days,
            Err(e) => {
                tracing::warn!(error = %e, "Trial policy unreadable, treating trials as disabled");
                0
            }
        }
    }

    // ========================================================================
    // Cache Access
    // ========================================================================

    async fn read_cache(&self, account_id: Uuid) -> AppResult<Option<SubscriptionRecord>> {
        with_cache_timeout(self.timeouts.cache, self.cache.get_by_account(account_id)).await
    }

    /// Persist `desired` unless it equals what is already cached.
    ///
    /// The write runs on its own task so it still completes if the caller is
    /// dropped mid-flight. Failures are logged and left for the next
    /// resolution to retry.
    async fn write_back(&self, cached: Option<&SubscriptionRecord>, desired: SubscriptionRecord) {
        if cached == Some(&desired) {
            return;
        }

        let cache = self.cache.clone();
        let timeout = self.timeouts.cache;
        let account_id = desired.account_id;
        let status = desired.status;
        let write = tokio::spawn(async move {
            match tokio::time::timeout(timeout, cache.upsert(&desired)).await {
                Ok(result) => result,
                Err(_) => Err(AppError::CacheWriteFailed("timed out".into())),
            }
        });

        match write.await {
            Ok(Ok(())) => {
                tracing::info!(account_id = %account_id, status = %status, "Subscription cache updated");
            }
            Ok(Err(e)) => {
                let e = match e {
                    AppError::CacheWriteFailed(_) => e,
                    other => AppError::CacheWriteFailed(other.to_string()),
                };
                tracing::warn!(account_id = %account_id, error = %e, "Correction not persisted");
            }
            Err(e) => {
                tracing::error!(account_id = %account_id, error = %e, "Cache write task failed");
            }
        }
    }

    async fn with_oracle_timeout<T>(&self, call: impl Future<Output = AppResult<T>>) -> AppResult<T> {
        tokio::time::timeout(self.timeouts.oracle, call)
            .await
            .map_err(|_| AppError::OracleUnavailable("request timed out".into()))?
    }

    // ========================================================================
    // Administration
    // ========================================================================

    /// Pin an account's status by administrative fiat, or release the pin
    /// with `None` so automatic reconciliation resumes.
    #[instrument(skip(self))]
    pub async fn set_override(
        &self,
        account_id: Uuid,
        status: Option<SubscriptionStatus>,
    ) -> AppResult<SubscriptionRecord> {
        let existing = self.read_cache(account_id).await?;
        let record = match (existing, status) {
            (Some(existing), Some(status)) => SubscriptionRecord {
                admin_override: true,
                ..existing.with_status(status)
            },
            (None, Some(status)) => SubscriptionRecord {
                admin_override: true,
                ..SubscriptionRecord::new(account_id, status)
            },
            (Some(existing), None) => SubscriptionRecord {
                admin_override: false,
                ..existing
            },
            (None, None) => return Err(AppError::NotFound),
        };

        with_cache_timeout(self.timeouts.cache, self.cache.upsert(&record)).await?;
        tracing::info!(
            status = %record.status,
            admin_override = record.admin_override,
            "Administrative override updated"
        );
        Ok(record)
    }

    pub async fn get_default_trial_days(&self) -> AppResult<u32> {
        self.trial_policy.get_default_trial_days().await
    }

    #[instrument(skip(self))]
    pub async fn set_default_trial_days(&self, days: i64) -> AppResult<u32> {
        let days = u32::try_from(days).map_err(|_| {
            AppError::InvalidInput("Trial days must be a non-negative integer".into())
        })?;
        self.trial_policy.set_default_trial_days(days).await?;
        tracing::info!(days, "Default trial length updated");
        Ok(days)
    }

    pub async fn list_by_status(
        &self,
        status: SubscriptionStatus,
    ) -> AppResult<Vec<SubscriptionRecord>> {
        self.cache.list_by_status(status).await
    }
}

/// Bound a subscription cache call. Running out of time is reported as a
/// database error.
pub async fn with_cache_timeout<T>(
    timeout: StdDuration,
    call: impl Future<Output = AppResult<T>>,
) -> AppResult<T> {
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| AppError::Database("Subscription cache timed out".into()))?
}

/// Pick the most recently created live subscription. More than one should
/// not happen; the rest are ignored.
fn select_authoritative(subscriptions: Vec<BillingSubscription>) -> Option<BillingSubscription> {
    let count = subscriptions.len();
    let chosen = subscriptions
        .into_iter()
        .filter(|s| s.status.grants_access())
        .max_by_key(|s| s.created_at);
    if count > 1 {
        tracing::warn!(
            count,
            chosen = ?chosen.as_ref().map(|s| s.id.as_str()),
            "Multiple live subscriptions for one customer"
        );
    }
    chosen
}

/// Only accounts that never held a provider subscription, were never
/// canceled and are not pinned can fall back to a trial.
fn is_trial_eligible(record: &SubscriptionRecord) -> bool {
    !record.admin_override
        && record.billing_subscription_id.is_none()
        && matches!(
            record.status,
            SubscriptionStatus::Trialing | SubscriptionStatus::Inactive
        )
}
