//! In-memory mock implementations for the entitlement ports.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration as StdDuration;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            billing_oracle::{
                BillingOraclePort, BillingSubscription, CancellationResult, CheckoutRequest,
                CustomerId, SubscriptionId,
            },
            clock::Clock,
        },
        use_cases::entitlement::{SubscriptionCacheRepo, TrialPolicyRepo},
    },
    domain::entities::subscription::{SubscriptionRecord, SubscriptionStatus},
};

// ============================================================================
// InMemorySubscriptionCache
// ============================================================================

#[derive(Default)]
pub struct InMemorySubscriptionCache {
    pub records: Mutex<HashMap<Uuid, SubscriptionRecord>>,
    writes: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    delay: Mutex<Option<StdDuration>>,
}

impl InMemorySubscriptionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<SubscriptionRecord>) -> Self {
        let cache = Self::new();
        for record in records {
            cache.insert(record);
        }
        cache
    }

    /// Seed a record without counting it as a write.
    pub fn insert(&self, record: SubscriptionRecord) {
        self.records
            .lock()
            .unwrap()
            .insert(record.account_id, record);
    }

    pub fn get(&self, account_id: Uuid) -> Option<SubscriptionRecord> {
        self.records.lock().unwrap().get(&account_id).cloned()
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Stall reads and writes, as a stuck datastore would.
    pub fn set_delay(&self, delay: StdDuration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    async fn stall(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl SubscriptionCacheRepo for InMemorySubscriptionCache {
    async fn get_by_account(&self, account_id: Uuid) -> AppResult<Option<SubscriptionRecord>> {
        self.stall().await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::Database("connection reset".into()));
        }
        Ok(self.get(account_id))
    }

    async fn upsert(&self, record: &SubscriptionRecord) -> AppResult<()> {
        self.stall().await;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("read-only transaction".into()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.insert(record.clone());
        Ok(())
    }

    async fn list_by_status(
        &self,
        status: SubscriptionStatus,
    ) -> AppResult<Vec<SubscriptionRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect())
    }
}

// ============================================================================
// InMemoryTrialPolicy
// ============================================================================

pub struct InMemoryTrialPolicy {
    days: Mutex<u32>,
}

impl InMemoryTrialPolicy {
    pub fn new(days: u32) -> Self {
        Self {
            days: Mutex::new(days),
        }
    }

    pub fn set(&self, days: u32) {
        *self.days.lock().unwrap() = days;
    }
}

#[async_trait]
impl TrialPolicyRepo for InMemoryTrialPolicy {
    async fn get_default_trial_days(&self) -> AppResult<u32> {
        Ok(*self.days.lock().unwrap())
    }

    async fn set_default_trial_days(&self, days: u32) -> AppResult<()> {
        self.set(days);
        Ok(())
    }
}

// ============================================================================
// MockBillingOracle
// ============================================================================

/// Scriptable billing provider: customers by email, subscriptions per
/// customer, and switches for outages and latency.
#[derive(Default)]
pub struct MockBillingOracle {
    customers: Mutex<HashMap<String, CustomerId>>,
    subscriptions: Mutex<Vec<BillingSubscription>>,
    checkouts: Mutex<Vec<CheckoutRequest>>,
    cancellations: Mutex<Vec<(String, bool)>>,
    unavailable: AtomicBool,
    delay: Mutex<Option<StdDuration>>,
    lookups: AtomicUsize,
}

impl MockBillingOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_customer(&self, email: &str, customer_id: &str) {
        self.customers
            .lock()
            .unwrap()
            .insert(email.to_string(), CustomerId::new(customer_id));
    }

    /// Register a subscription, creating its customer under `email`.
    pub fn add_subscription(&self, email: &str, subscription: BillingSubscription) {
        self.customers
            .lock()
            .unwrap()
            .insert(email.to_string(), subscription.customer_id.clone());
        self.subscriptions.lock().unwrap().push(subscription);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: StdDuration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    /// Number of customer lookups, i.e. resolutions that reached the provider.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    pub fn checkout_count(&self) -> usize {
        self.checkouts.lock().unwrap().len()
    }

    pub fn last_checkout(&self) -> Option<CheckoutRequest> {
        self.checkouts.lock().unwrap().last().cloned()
    }

    pub fn cancellations(&self) -> Vec<(String, bool)> {
        self.cancellations.lock().unwrap().clone()
    }

    async fn simulate_network(&self) -> AppResult<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::OracleUnavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingOraclePort for MockBillingOracle {
    async fn find_customer_by_email(&self, email: &str) -> AppResult<Option<CustomerId>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.simulate_network().await?;
        Ok(self.customers.lock().unwrap().get(email).cloned())
    }

    async fn list_active_subscriptions(
        &self,
        customer_id: &CustomerId,
    ) -> AppResult<Vec<BillingSubscription>> {
        self.simulate_network().await?;
        Ok(self
            .subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| &s.customer_id == customer_id && s.status.grants_access())
            .cloned()
            .collect())
    }

    async fn create_checkout_session(&self, request: &CheckoutRequest) -> AppResult<String> {
        self.simulate_network().await?;
        let mut checkouts = self.checkouts.lock().unwrap();
        checkouts.push(request.clone());
        Ok(format!(
            "https://checkout.test/session/cs_test_{}",
            checkouts.len()
        ))
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &SubscriptionId,
        at_period_end: bool,
    ) -> AppResult<CancellationResult> {
        self.simulate_network().await?;
        let mut subscriptions = self.subscriptions.lock().unwrap();
        let subscription = subscriptions
            .iter_mut()
            .find(|s| &s.id == subscription_id)
            .ok_or_else(|| AppError::OracleUnavailable("No such subscription".into()))?;

        self.cancellations
            .lock()
            .unwrap()
            .push((subscription_id.as_str().to_string(), at_period_end));

        if at_period_end {
            subscription.cancel_at = Some(subscription.current_period_end);
            Ok(CancellationResult {
                status: subscription.status,
                cancel_at: subscription.cancel_at,
            })
        } else {
            subscription.status = SubscriptionStatus::Canceled;
            Ok(CancellationResult {
                status: SubscriptionStatus::Canceled,
                cancel_at: None,
            })
        }
    }
}

// ============================================================================
// FixedClock
// ============================================================================

pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}
