use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::{
        billing_oracle::{
            BillingOraclePort, BillingSubscription, CancellationResult, CheckoutCustomer,
            CheckoutRequest, CustomerId, SubscriptionId,
        },
        clock::Clock,
    },
    domain::entities::subscription::SubscriptionStatus,
};

const BILLING_PERIOD_DAYS: i64 = 30;

#[derive(Default)]
struct DummyLedger {
    customers: HashMap<String, CustomerId>,
    subscriptions: Vec<BillingSubscription>,
}

/// Billing provider simulated in memory, for running without Stripe
/// credentials.
///
/// Checkout completes instantly: the subscription exists as soon as the
/// session is created and the returned URL is the success page.
#[derive(Clone)]
pub struct DummyBillingClient {
    ledger: Arc<RwLock<DummyLedger>>,
    clock: Arc<dyn Clock>,
}

impl DummyBillingClient {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(DummyLedger::default())),
            clock,
        }
    }

    /// Deterministic customer id for an email.
    fn customer_id_for(email: &str) -> CustomerId {
        CustomerId::new(format!(
            "dummy_cus_{}",
            Uuid::new_v5(&Uuid::NAMESPACE_OID, email.as_bytes()).simple()
        ))
    }

    fn generate_subscription_id() -> SubscriptionId {
        SubscriptionId::new(format!("dummy_sub_{}", Uuid::new_v4().simple()))
    }

    fn open_subscription(
        customer_id: CustomerId,
        trial_days: Option<u32>,
        now: DateTime<Utc>,
    ) -> BillingSubscription {
        let trial_end = trial_days
            .filter(|d| *d > 0)
            .map(|d| now + Duration::days(i64::from(d)));
        BillingSubscription {
            id: Self::generate_subscription_id(),
            customer_id,
            status: if trial_end.is_some() {
                SubscriptionStatus::Trialing
            } else {
                SubscriptionStatus::Active
            },
            current_period_end: trial_end.unwrap_or(now + Duration::days(BILLING_PERIOD_DAYS)),
            trial_end,
            cancel_at: None,
            created_at: now,
        }
    }
}

#[async_trait]
impl BillingOraclePort for DummyBillingClient {
    async fn find_customer_by_email(&self, email: &str) -> AppResult<Option<CustomerId>> {
        Ok(self.ledger.read().await.customers.get(email).cloned())
    }

    async fn list_active_subscriptions(
        &self,
        customer_id: &CustomerId,
    ) -> AppResult<Vec<BillingSubscription>> {
        let now = self.clock.now();
        let ledger = self.ledger.read().await;
        Ok(ledger
            .subscriptions
            .iter()
            .filter(|s| &s.customer_id == customer_id && s.status.grants_access())
            .filter(|s| s.cancel_at.is_none_or(|at| at > now))
            .cloned()
            .collect())
    }

    async fn create_checkout_session(&self, request: &CheckoutRequest) -> AppResult<String> {
        let now = self.clock.now();
        let mut ledger = self.ledger.write().await;

        let customer_id = match &request.customer {
            CheckoutCustomer::Existing(id) => id.clone(),
            CheckoutCustomer::Email(email) => ledger
                .customers
                .entry(email.clone())
                .or_insert_with(|| Self::customer_id_for(email))
                .clone(),
        };

        let subscription = Self::open_subscription(customer_id, request.trial_days, now);
        tracing::info!(
            account_id = %request.account_id,
            subscription_id = %subscription.id,
            status = %subscription.status,
            "Dummy checkout completed"
        );
        ledger.subscriptions.push(subscription);

        let session_id = format!("dummy_cs_{}", Uuid::new_v4().simple());
        Ok(request
            .success_url
            .replace("{CHECKOUT_SESSION_ID}", &session_id))
    }

    async fn cancel_subscription(
        &self,
        subscription_id: &SubscriptionId,
        at_period_end: bool,
    ) -> AppResult<CancellationResult> {
        let mut ledger = self.ledger.write().await;
        let subscription = ledger
            .subscriptions
            .iter_mut()
            .find(|s| &s.id == subscription_id)
            .ok_or_else(|| {
                AppError::OracleUnavailable(format!("No such subscription: {}", subscription_id))
            })?;

        if at_period_end {
            subscription.cancel_at = Some(subscription.current_period_end);
        } else {
            subscription.status = SubscriptionStatus::Canceled;
        }

        Ok(CancellationResult {
            status: subscription.status,
            cancel_at: subscription.cancel_at,
        })
    }
}
