//! Per-account entitlement sessions.
//!
//! An `EntitlementClient` tracks the signed-in account and memoizes the last
//! resolved access snapshot, so repeated reads do not hit the resolver. The
//! `SessionRegistry` keeps one client per account for the HTTP layer.
//!
//! A memoized snapshot is served until the access it grants runs out or
//! `SNAPSHOT_TTL_SECS` pass, whichever comes first. Clients idle for
//! `SESSION_IDLE_SECS` are dropped from the registry.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::use_cases::subscription_lifecycle::{
        CheckoutOutcome, SubscriptionLifecycleUseCases,
    },
    domain::entities::{
        account::Account,
        entitlement::{EntitlementDecision, SubscriptionSummary, days_until},
    },
};

/// Longest a memoized snapshot is served without resolving again.
pub const SNAPSHOT_TTL_SECS: i64 = 5 * 60;
/// Registry entries unused for this long are evicted.
pub const SESSION_IDLE_SECS: i64 = 30 * 60;
const SWEEP_INTERVAL_SECS: i64 = 60;

// ============================================================================
// Access Snapshot
// ============================================================================

/// What callers see of an entitlement decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessSnapshot {
    pub has_access: bool,
    pub is_in_trial_period: bool,
    pub trial_days_left: i64,
    pub trial_end_date: Option<DateTime<Utc>>,
    /// Days of access remaining, whether from a trial or a paid period.
    pub days_left: i64,
    pub end_date: Option<DateTime<Utc>>,
    pub subscription: Option<SubscriptionSummary>,
}

impl AccessSnapshot {
    pub fn no_access() -> Self {
        Self::from_decision(&EntitlementDecision::no_access(), Utc::now())
    }

    pub fn from_decision(decision: &EntitlementDecision, now: DateTime<Utc>) -> Self {
        let end_date = if decision.is_in_trial_period {
            decision.trial_end_date
        } else if decision.has_access {
            let cancel_at = decision.subscription.as_ref().and_then(|s| s.cancel_at);
            match (decision.current_period_end, cancel_at) {
                (Some(end), Some(cancel)) => Some(end.min(cancel)),
                (end, cancel) => end.or(cancel),
            }
        } else {
            None
        };

        let days_left = if decision.is_in_trial_period {
            decision.trial_days_left
        } else {
            end_date.map(|end| days_until(end, now)).unwrap_or(0)
        };

        Self {
            has_access: decision.has_access,
            is_in_trial_period: decision.is_in_trial_period,
            trial_days_left: decision.trial_days_left,
            trial_end_date: decision.trial_end_date,
            days_left,
            end_date,
            subscription: decision.subscription.clone(),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

struct Memo {
    snapshot: AccessSnapshot,
    fresh_until: DateTime<Utc>,
}

/// Entitlement state for one signed-in account.
pub struct EntitlementSession {
    account: Account,
    lifecycle: SubscriptionLifecycleUseCases,
    /// Held across an in-flight resolution so concurrent readers share it.
    memo: Mutex<Option<Memo>>,
}

impl EntitlementSession {
    fn new(account: Account, lifecycle: SubscriptionLifecycleUseCases) -> Self {
        Self {
            account,
            lifecycle,
            memo: Mutex::new(None),
        }
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    fn now(&self) -> DateTime<Utc> {
        self.lifecycle.entitlements().now()
    }

    async fn access(&self) -> AccessSnapshot {
        let mut memo = self.memo.lock().await;
        let now = self.now();
        if let Some(current) = memo.as_ref().filter(|m| now < m.fresh_until) {
            return current.snapshot.clone();
        }
        let decision = self.lifecycle.entitlements().resolve(&self.account).await;
        self.store(&mut memo, &decision)
    }

    async fn recheck(&self) -> AccessSnapshot {
        let mut memo = self.memo.lock().await;
        let decision = self.lifecycle.entitlements().resolve(&self.account).await;
        self.store(&mut memo, &decision)
    }

    async fn sync(&self) -> AccessSnapshot {
        let mut memo = self.memo.lock().await;
        let decision = self.lifecycle.sync(&self.account).await;
        self.store(&mut memo, &decision)
    }

    async fn replace(&self, decision: &EntitlementDecision) -> AccessSnapshot {
        let mut memo = self.memo.lock().await;
        self.store(&mut memo, decision)
    }

    fn store(&self, slot: &mut Option<Memo>, decision: &EntitlementDecision) -> AccessSnapshot {
        let now = self.now();
        let snapshot = AccessSnapshot::from_decision(decision, now);
        let ttl_end = now + Duration::seconds(SNAPSHOT_TTL_SECS);
        let fresh_until = match snapshot.end_date {
            Some(end) if snapshot.has_access => end.min(ttl_end),
            _ => ttl_end,
        };
        *slot = Some(Memo {
            snapshot: snapshot.clone(),
            fresh_until,
        });
        snapshot
    }
}

// ============================================================================
// Client
// ============================================================================

/// Facade over the entitlement engine for a single caller.
pub struct EntitlementClient {
    lifecycle: SubscriptionLifecycleUseCases,
    session: RwLock<Option<Arc<EntitlementSession>>>,
}

impl EntitlementClient {
    pub fn new(lifecycle: SubscriptionLifecycleUseCases) -> Self {
        Self {
            lifecycle,
            session: RwLock::new(None),
        }
    }

    /// Bind the client to an account. Re-binding an identical account keeps
    /// the memoized snapshot; any other account or `None` discards it.
    pub async fn set_account(&self, account: Option<Account>) {
        let mut session = self.session.write().await;
        match account {
            Some(account) => {
                let same = session
                    .as_ref()
                    .is_some_and(|current| current.account == account);
                if !same {
                    tracing::debug!(account_id = %account.id, "Starting entitlement session");
                    *session = Some(Arc::new(EntitlementSession::new(
                        account,
                        self.lifecycle.clone(),
                    )));
                }
            }
            None => {
                if let Some(previous) = session.take() {
                    tracing::debug!(account_id = %previous.account.id, "Entitlement session ended");
                }
            }
        }
    }

    async fn current(&self) -> Option<Arc<EntitlementSession>> {
        self.session.read().await.clone()
    }

    /// Current access, resolving at most once per session.
    pub async fn access(&self) -> AccessSnapshot {
        match self.current().await {
            Some(session) => session.access().await,
            None => AccessSnapshot::no_access(),
        }
    }

    /// Force a fresh resolution.
    pub async fn recheck(&self) -> AccessSnapshot {
        match self.current().await {
            Some(session) => session.recheck().await,
            None => AccessSnapshot::no_access(),
        }
    }

    /// Reconcile with the billing provider first, e.g. after returning from
    /// checkout.
    pub async fn sync(&self) -> AccessSnapshot {
        match self.current().await {
            Some(session) => session.sync().await,
            None => AccessSnapshot::no_access(),
        }
    }

    /// Checkout URL to redirect to, or `None` when the account is already
    /// subscribed.
    pub async fn create_subscription(&self, with_trial: bool) -> AppResult<Option<String>> {
        let session = self.current().await.ok_or(AppError::IdentityMissing)?;
        match self
            .lifecycle
            .create_subscription(&session.account, with_trial)
            .await?
        {
            CheckoutOutcome::AlreadySubscribed => {
                session.recheck().await;
                Ok(None)
            }
            CheckoutOutcome::Redirect(url) => Ok(Some(url)),
        }
    }

    /// Returns whether the cancellation went through. Failures are logged.
    pub async fn cancel_subscription(&self) -> bool {
        let Some(session) = self.current().await else {
            return false;
        };
        match self.lifecycle.cancel_subscription(&session.account).await {
            Ok(decision) => {
                session.replace(&decision).await;
                true
            }
            Err(e) => {
                tracing::warn!(account_id = %session.account.id, error = %e, "Cancellation failed");
                false
            }
        }
    }
}

// ============================================================================
// Registry
// ============================================================================

struct RegisteredClient {
    client: Arc<EntitlementClient>,
    last_seen: DateTime<Utc>,
}

#[derive(Default)]
struct Registered {
    clients: HashMap<Uuid, RegisteredClient>,
    last_sweep: Option<DateTime<Utc>>,
}

impl Registered {
    fn sweep(&mut self, now: DateTime<Utc>) {
        if self
            .last_sweep
            .is_some_and(|at| now - at < Duration::seconds(SWEEP_INTERVAL_SECS))
        {
            return;
        }
        self.last_sweep = Some(now);

        let before = self.clients.len();
        let idle_after = Duration::seconds(SESSION_IDLE_SECS);
        self.clients.retain(|_, c| now - c.last_seen < idle_after);
        let evicted = before - self.clients.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Idle entitlement sessions evicted");
        }
    }
}

/// One `EntitlementClient` per signed-in account.
pub struct SessionRegistry {
    lifecycle: SubscriptionLifecycleUseCases,
    registered: RwLock<Registered>,
}

impl SessionRegistry {
    pub fn new(lifecycle: SubscriptionLifecycleUseCases) -> Self {
        Self {
            lifecycle,
            registered: RwLock::new(Registered::default()),
        }
    }

    pub async fn client_for(&self, account: &Account) -> Arc<EntitlementClient> {
        let now = self.lifecycle.entitlements().now();
        let client = {
            let mut registered = self.registered.write().await;
            registered.sweep(now);
            let entry = registered
                .clients
                .entry(account.id)
                .or_insert_with(|| RegisteredClient {
                    client: Arc::new(EntitlementClient::new(self.lifecycle.clone())),
                    last_seen: now,
                });
            entry.last_seen = now;
            entry.client.clone()
        };
        client.set_account(Some(account.clone())).await;
        client
    }

    /// Drop the account's session. Returns whether one existed.
    pub async fn end_session(&self, account_id: Uuid) -> bool {
        let removed = self.registered.write().await.clients.remove(&account_id);
        match removed {
            Some(entry) => {
                entry.client.set_account(None).await;
                true
            }
            None => false,
        }
    }

    /// Drop the memoized snapshot for an account, e.g. after an
    /// administrative change.
    pub async fn invalidate(&self, account_id: Uuid) {
        let client = self
            .registered
            .read()
            .await
            .clients
            .get(&account_id)
            .map(|entry| entry.client.clone());
        if let Some(client) = client {
            client.set_account(None).await;
        }
    }

    pub async fn active_sessions(&self) -> usize {
        self.registered.read().await.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        application::use_cases::{
            entitlement::{EntitlementUseCases, ResolverTimeouts},
            subscription_lifecycle::CheckoutUrls,
        },
        domain::entities::subscription::SubscriptionStatus,
        test_utils::{
            FixedClock, InMemorySubscriptionCache, InMemoryTrialPolicy, MockBillingOracle,
            create_test_account, create_test_billing_subscription, create_test_record, test_now,
        },
    };
    use chrono::Duration;

    struct Harness {
        cache: Arc<InMemorySubscriptionCache>,
        oracle: Arc<MockBillingOracle>,
        clock: Arc<FixedClock>,
        lifecycle: SubscriptionLifecycleUseCases,
    }

    fn harness(trial_days: u32) -> Harness {
        let cache = Arc::new(InMemorySubscriptionCache::new());
        let trial_policy = Arc::new(InMemoryTrialPolicy::new(trial_days));
        let oracle = Arc::new(MockBillingOracle::new());
        let clock = Arc::new(FixedClock::new(test_now()));
        let entitlements = EntitlementUseCases::new(
            cache.clone(),
            trial_policy.clone(),
            oracle.clone(),
            clock.clone(),
            ResolverTimeouts::default(),
        );
        let lifecycle = SubscriptionLifecycleUseCases::new(
            entitlements,
            cache.clone(),
            trial_policy,
            oracle.clone(),
            CheckoutUrls::for_origin("http://localhost:3000"),
            ResolverTimeouts::default(),
        );
        Harness {
            cache,
            oracle,
            clock,
            lifecycle,
        }
    }

    #[test]
    fn test_snapshot_days_left_for_paid_period_uses_cancel_at() {
        let mut record = create_test_record(Uuid::new_v4(), |r| {
            r.status = SubscriptionStatus::Active;
            r.current_period_end = Some(test_now() + Duration::days(30));
        });
        record.cancel_at = Some(test_now() + Duration::days(6));

        let snapshot =
            AccessSnapshot::from_decision(&EntitlementDecision::paid(&record), test_now());

        assert_eq!(snapshot.days_left, 6);
        assert_eq!(snapshot.end_date, Some(test_now() + Duration::days(6)));
        assert_eq!(snapshot.trial_days_left, 0);
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let json = serde_json::to_value(AccessSnapshot::no_access()).unwrap();
        assert_eq!(json["hasAccess"], false);
        assert_eq!(json["daysLeft"], 0);
        assert!(json["trialEndDate"].is_null());
        assert!(json["endDate"].is_null());
    }

    #[tokio::test]
    async fn no_account_means_no_access() {
        let h = harness(14);
        let client = EntitlementClient::new(h.lifecycle.clone());

        assert_eq!(client.access().await, AccessSnapshot::no_access());
        assert!(!client.cancel_subscription().await);
        assert!(matches!(
            client.create_subscription(true).await,
            Err(AppError::IdentityMissing)
        ));
        assert_eq!(h.oracle.lookup_count(), 0);
    }

    #[tokio::test]
    async fn access_resolves_once_per_session() {
        let h = harness(14);
        let client = Arc::new(EntitlementClient::new(h.lifecycle.clone()));
        let account = create_test_account(|a| a.created_at = test_now() - Duration::days(10));
        client.set_account(Some(account.clone())).await;

        let (a, b, c) = tokio::join!(client.access(), client.access(), client.access());

        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.days_left, 4);
        assert_eq!(h.oracle.lookup_count(), 1);

        // Re-binding the same account keeps the memoized snapshot.
        client.set_account(Some(account)).await;
        client.access().await;
        assert_eq!(h.oracle.lookup_count(), 1);
    }

    #[tokio::test]
    async fn switching_accounts_starts_fresh_session() {
        let h = harness(14);
        let client = EntitlementClient::new(h.lifecycle.clone());
        let first = create_test_account(|a| a.created_at = test_now() - Duration::days(1));
        let second = create_test_account(|a| {
            a.email = "second@example.com".into();
            a.created_at = test_now() - Duration::days(30);
        });

        client.set_account(Some(first)).await;
        assert!(client.access().await.has_access);

        client.set_account(Some(second)).await;
        assert!(!client.access().await.has_access);

        client.set_account(None).await;
        assert_eq!(client.access().await, AccessSnapshot::no_access());
    }

    #[tokio::test]
    async fn recheck_sees_changes_behind_the_snapshot() {
        let h = harness(14);
        let client = EntitlementClient::new(h.lifecycle.clone());
        let account = create_test_account(|a| a.created_at = test_now() - Duration::days(30));
        client.set_account(Some(account.clone())).await;
        assert!(!client.access().await.has_access);

        h.cache.insert(create_test_record(account.id, |r| {
            r.status = SubscriptionStatus::Active;
            r.current_period_end = Some(test_now() + Duration::days(20));
        }));
        assert!(!client.access().await.has_access);

        let snapshot = client.recheck().await;
        assert!(snapshot.has_access);
        assert_eq!(snapshot.days_left, 20);
    }

    #[tokio::test]
    async fn create_when_subscribed_returns_no_url() {
        let h = harness(14);
        let client = EntitlementClient::new(h.lifecycle.clone());
        let account = create_test_account(|_| {});
        h.oracle.add_subscription(
            &account.email,
            create_test_billing_subscription("cus_1", |_| {}),
        );
        client.set_account(Some(account)).await;

        let url = client.create_subscription(true).await.unwrap();

        assert_eq!(url, None);
        assert_eq!(h.oracle.checkout_count(), 0);
        assert!(client.access().await.has_access);
    }

    #[tokio::test]
    async fn cancel_refreshes_snapshot() {
        let h = harness(14);
        let client = EntitlementClient::new(h.lifecycle.clone());
        let account = create_test_account(|a| a.created_at = test_now() - Duration::days(2));
        client.set_account(Some(account)).await;
        assert!(client.access().await.is_in_trial_period);

        assert!(client.cancel_subscription().await);

        assert!(!client.access().await.has_access);
    }

    #[tokio::test]
    async fn sync_after_checkout_picks_up_subscription() {
        let h = harness(14);
        let client = EntitlementClient::new(h.lifecycle.clone());
        let account = create_test_account(|a| a.created_at = test_now() - Duration::days(2));
        client.set_account(Some(account.clone())).await;
        assert!(client.access().await.is_in_trial_period);

        h.oracle.add_subscription(
            &account.email,
            create_test_billing_subscription("cus_1", |_| {}),
        );
        let snapshot = client.sync().await;

        assert!(snapshot.has_access);
        assert!(!snapshot.is_in_trial_period);
    }

    #[tokio::test]
    async fn registry_reuses_clients_and_ends_sessions() {
        let h = harness(14);
        let registry = SessionRegistry::new(h.lifecycle.clone());
        let account = create_test_account(|a| a.created_at = test_now() - Duration::days(1));

        let first = registry.client_for(&account).await;
        first.access().await;
        let second = registry.client_for(&account).await;
        second.access().await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(h.oracle.lookup_count(), 1);
        assert_eq!(registry.active_sessions().await, 1);

        assert!(registry.end_session(account.id).await);
        assert_eq!(first.access().await, AccessSnapshot::no_access());
        assert!(!registry.end_session(account.id).await);
        assert_eq!(registry.active_sessions().await, 0);
    }

    #[tokio::test]
    async fn trial_snapshot_expires_with_the_trial() {
        let h = harness(14);
        let registry = SessionRegistry::new(h.lifecycle.clone());
        let account = create_test_account(|a| a.created_at = test_now() - Duration::days(10));

        let before = registry.client_for(&account).await.access().await;
        assert!(before.has_access);
        assert_eq!(before.days_left, 4);

        h.clock.advance(Duration::days(30));
        let after = registry.client_for(&account).await.access().await;

        assert!(!after.has_access);
        assert_eq!(after.days_left, 0);
        assert_eq!(
            h.cache.get(account.id).unwrap().status,
            SubscriptionStatus::Inactive
        );
    }

    #[tokio::test]
    async fn memoized_snapshot_is_resolved_again_after_ttl() {
        let h = harness(14);
        let client = EntitlementClient::new(h.lifecycle.clone());
        let account = create_test_account(|a| a.created_at = test_now() - Duration::days(30));
        client.set_account(Some(account.clone())).await;
        assert!(!client.access().await.has_access);

        h.cache.insert(create_test_record(account.id, |r| {
            r.status = SubscriptionStatus::Active;
            r.current_period_end = Some(test_now() + Duration::days(20));
        }));
        h.clock.advance(Duration::seconds(SNAPSHOT_TTL_SECS - 1));
        assert!(!client.access().await.has_access);

        h.clock.advance(Duration::seconds(1));
        assert!(client.access().await.has_access);
    }

    #[tokio::test]
    async fn paid_snapshot_expires_at_period_end() {
        let h = harness(0);
        let client = EntitlementClient::new(h.lifecycle.clone());
        let account = create_test_account(|_| {});
        h.cache.insert(create_test_record(account.id, |r| {
            r.status = SubscriptionStatus::Active;
            r.current_period_end = Some(test_now() + Duration::seconds(30));
        }));
        client.set_account(Some(account)).await;
        assert!(client.access().await.has_access);

        h.clock.advance(Duration::seconds(31));

        assert!(!client.access().await.has_access);
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted() {
        let h = harness(14);
        let registry = SessionRegistry::new(h.lifecycle.clone());
        let idle = create_test_account(|_| {});
        let busy = create_test_account(|a| a.email = "busy@example.com".into());

        registry.client_for(&idle).await;
        registry.client_for(&busy).await;
        assert_eq!(registry.active_sessions().await, 2);

        h.clock.advance(Duration::seconds(SESSION_IDLE_SECS - 60));
        registry.client_for(&busy).await;
        h.clock.advance(Duration::seconds(120));
        registry.client_for(&busy).await;

        assert_eq!(registry.active_sessions().await, 1);
        assert!(!registry.end_session(idle.id).await);
        assert!(registry.end_session(busy.id).await);
    }

    #[tokio::test]
    async fn rebinding_changed_account_replaces_it() {
        let h = harness(14);
        let client = EntitlementClient::new(h.lifecycle.clone());
        let account = create_test_account(|_| {});
        client.set_account(Some(account.clone())).await;

        let renamed = Account {
            email: "renamed@example.com".into(),
            ..account
        };
        client.set_account(Some(renamed)).await;

        let session = client.current().await.unwrap();
        assert_eq!(session.account().email, "renamed@example.com");
    }
}
