//! Test data factories for creating valid test fixtures.
//!
//! Each factory function creates a complete, valid object with sensible defaults.
//! Use the closure parameter to override specific fields as needed.

use chrono::{DateTime, Duration, TimeZone, Utc};
use uuid::Uuid;

use crate::{
    application::ports::billing_oracle::{BillingSubscription, CustomerId, SubscriptionId},
    domain::entities::{
        account::Account,
        subscription::{SubscriptionRecord, SubscriptionStatus},
    },
};

/// The instant every test clock starts at.
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

/// Create a test account with sensible defaults.
pub fn create_test_account(overrides: impl FnOnce(&mut Account)) -> Account {
    let mut account = Account {
        id: Uuid::new_v4(),
        email: "user@example.com".to_string(),
        created_at: test_now() - Duration::days(3),
    };
    overrides(&mut account);
    account
}

/// Create a test subscription record. Defaults to an inactive record with no
/// billing references.
pub fn create_test_record(
    account_id: Uuid,
    overrides: impl FnOnce(&mut SubscriptionRecord),
) -> SubscriptionRecord {
    let mut record = SubscriptionRecord::new(account_id, SubscriptionStatus::Inactive);
    overrides(&mut record);
    record
}

/// Create a provider subscription, active for another 30 days by default.
pub fn create_test_billing_subscription(
    customer_id: &str,
    overrides: impl FnOnce(&mut BillingSubscription),
) -> BillingSubscription {
    let mut subscription = BillingSubscription {
        id: SubscriptionId::new("sub_test123"),
        customer_id: CustomerId::new(customer_id),
        status: SubscriptionStatus::Active,
        current_period_end: test_now() + Duration::days(30),
        trial_end: None,
        cancel_at: None,
        created_at: test_now() - Duration::days(1),
    };
    overrides(&mut subscription);
    subscription
}
