use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    Canceled,
    Incomplete,
    IncompleteExpired,
    PastDue,
    Unpaid,
    Paused,
    Inactive,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Inactive => "inactive",
        }
    }

    /// Convert from a billing provider subscription status string.
    /// Unknown values are treated as `incomplete`.
    pub fn from_provider(s: &str) -> Self {
        match s {
            "trialing" => SubscriptionStatus::Trialing,
            "active" => SubscriptionStatus::Active,
            "canceled" | "cancelled" => SubscriptionStatus::Canceled,
            "incomplete" => SubscriptionStatus::Incomplete,
            "incomplete_expired" => SubscriptionStatus::IncompleteExpired,
            "past_due" => SubscriptionStatus::PastDue,
            "unpaid" => SubscriptionStatus::Unpaid,
            "paused" => SubscriptionStatus::Paused,
            _ => SubscriptionStatus::Incomplete,
        }
    }

    /// Statuses that grant access when the record is administratively pinned,
    /// and the only statuses a provider subscription can be reconciled from.
    pub fn grants_access(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Active | SubscriptionStatus::Trialing
        )
    }

    /// Statuses an account can cancel itself.
    pub fn is_cancellable(&self) -> bool {
        self.grants_access()
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trialing" => Ok(SubscriptionStatus::Trialing),
            "active" => Ok(SubscriptionStatus::Active),
            "canceled" => Ok(SubscriptionStatus::Canceled),
            "incomplete" => Ok(SubscriptionStatus::Incomplete),
            "incomplete_expired" => Ok(SubscriptionStatus::IncompleteExpired),
            "past_due" => Ok(SubscriptionStatus::PastDue),
            "unpaid" => Ok(SubscriptionStatus::Unpaid),
            "paused" => Ok(SubscriptionStatus::Paused),
            "inactive" => Ok(SubscriptionStatus::Inactive),
            _ => Err(format!("Invalid subscription status: {}", s)),
        }
    }
}

/// Cached subscription state for one account.
///
/// Store-managed timestamps are deliberately not part of the value: two
/// records compare equal exactly when writing one over the other would be a
/// no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRecord {
    pub account_id: Uuid,
    pub status: SubscriptionStatus,
    pub billing_subscription_id: Option<String>,
    pub billing_customer_id: Option<String>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end_date: Option<DateTime<Utc>>,
    pub cancel_at: Option<DateTime<Utc>>,
    pub admin_override: bool,
}

impl SubscriptionRecord {
    /// A record with no billing references in the given status.
    pub fn new(account_id: Uuid, status: SubscriptionStatus) -> Self {
        Self {
            account_id,
            status,
            billing_subscription_id: None,
            billing_customer_id: None,
            current_period_end: None,
            trial_end_date: None,
            cancel_at: None,
            admin_override: false,
        }
    }

    pub fn trialing(account_id: Uuid, trial_end: DateTime<Utc>) -> Self {
        Self {
            trial_end_date: Some(trial_end),
            ..Self::new(account_id, SubscriptionStatus::Trialing)
        }
    }

    /// Copy of this record with a new status. Moving to `active` drops any
    /// trial end, since a paid period supersedes the trial.
    pub fn with_status(&self, status: SubscriptionStatus) -> Self {
        let mut next = self.clone();
        next.status = status;
        if status == SubscriptionStatus::Active {
            next.trial_end_date = None;
        }
        next
    }

    /// Earliest moment at which an active record stops granting access.
    pub fn access_ends_at(&self) -> Option<DateTime<Utc>> {
        match (self.current_period_end, self.cancel_at) {
            (Some(end), Some(cancel)) => Some(end.min(cancel)),
            (end, cancel) => end.or(cancel),
        }
    }
}
