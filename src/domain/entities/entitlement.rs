use chrono::{DateTime, Utc};
use serde::Serialize;

use super::subscription::{SubscriptionRecord, SubscriptionStatus};

const SECONDS_PER_DAY: i64 = 86_400;

/// Whole days from `now` until `end`, rounded up and floored at zero.
pub fn days_until(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (end - now).num_seconds();
    if secs <= 0 {
        return 0;
    }
    (secs + SECONDS_PER_DAY - 1) / SECONDS_PER_DAY
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSummary {
    pub id: Option<String>,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
    pub cancel_at: Option<DateTime<Utc>>,
}

impl From<&SubscriptionRecord> for SubscriptionSummary {
    fn from(record: &SubscriptionRecord) -> Self {
        Self {
            id: record.billing_subscription_id.clone(),
            status: record.status,
            current_period_end: record.current_period_end,
            cancel_at: record.cancel_at,
        }
    }
}

/// Outcome of resolving an account's entitlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementDecision {
    pub has_access: bool,
    pub status: SubscriptionStatus,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_days_left: i64,
    pub trial_end_date: Option<DateTime<Utc>>,
    pub is_in_trial_period: bool,
    pub subscription: Option<SubscriptionSummary>,
}

impl EntitlementDecision {
    /// The conservative decision: nothing is known, nothing is granted.
    pub fn no_access() -> Self {
        Self {
            has_access: false,
            status: SubscriptionStatus::Inactive,
            current_period_end: None,
            trial_days_left: 0,
            trial_end_date: None,
            is_in_trial_period: false,
            subscription: None,
        }
    }

    /// A paid period in progress. Never carries trial information.
    pub fn paid(record: &SubscriptionRecord) -> Self {
        Self {
            has_access: true,
            status: SubscriptionStatus::Active,
            current_period_end: record.current_period_end,
            trial_days_left: 0,
            trial_end_date: None,
            is_in_trial_period: false,
            subscription: Some(record.into()),
        }
    }

    /// A trial that is still running at `now`.
    pub fn trial(record: &SubscriptionRecord, trial_end: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self {
            has_access: true,
            status: SubscriptionStatus::Trialing,
            current_period_end: None,
            trial_days_left: days_until(trial_end, now),
            trial_end_date: Some(trial_end),
            is_in_trial_period: true,
            subscription: Some(record.into()),
        }
    }

    /// No access, reporting whatever the record says.
    pub fn denied(record: &SubscriptionRecord) -> Self {
        Self {
            has_access: false,
            status: record.status,
            current_period_end: None,
            trial_days_left: 0,
            trial_end_date: None,
            is_in_trial_period: false,
            subscription: Some(record.into()),
        }
    }

    /// Decision for a record whose status was pinned by an administrator.
    pub fn overridden(record: &SubscriptionRecord, now: DateTime<Utc>) -> Self {
        match record.status {
            SubscriptionStatus::Active => Self::paid(record),
            SubscriptionStatus::Trialing => Self {
                has_access: true,
                status: SubscriptionStatus::Trialing,
                current_period_end: None,
                trial_days_left: record
                    .trial_end_date
                    .map(|end| days_until(end, now))
                    .unwrap_or(0),
                trial_end_date: record.trial_end_date,
                is_in_trial_period: true,
                subscription: Some(record.into()),
            },
            _ => Self::denied(record),
        }
    }
}
