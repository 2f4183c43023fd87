use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// An authenticated account as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: Uuid, email: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            email: email.into(),
            created_at,
        }
    }
}
