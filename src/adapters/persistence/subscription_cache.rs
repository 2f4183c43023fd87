use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::entitlement::SubscriptionCacheRepo,
    domain::entities::subscription::{SubscriptionRecord, SubscriptionStatus},
};

fn row_to_record(row: &sqlx::postgres::PgRow) -> SubscriptionRecord {
    SubscriptionRecord {
        account_id: row.get("account_id"),
        status: row.get("status"),
        billing_subscription_id: row.get("billing_subscription_id"),
        billing_customer_id: row.get("billing_customer_id"),
        current_period_end: row.get("current_period_end"),
        trial_end_date: row.get("trial_end_date"),
        cancel_at: row.get("cancel_at"),
        admin_override: row.get("admin_override"),
    }
}

const SELECT_COLS: &str = r#"
    account_id, status, billing_subscription_id, billing_customer_id,
    current_period_end, trial_end_date, cancel_at, admin_override
"#;

#[async_trait]
impl SubscriptionCacheRepo for PostgresPersistence {
    async fn get_by_account(&self, account_id: Uuid) -> AppResult<Option<SubscriptionRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE account_id = $1",
            SELECT_COLS
        ))
        .bind(account_id)
        .fetch_optional(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(row.as_ref().map(row_to_record))
    }

    async fn upsert(&self, record: &SubscriptionRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (
                account_id, status, billing_subscription_id, billing_customer_id,
                current_period_end, trial_end_date, cancel_at, admin_override
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (account_id) DO UPDATE SET
                status = EXCLUDED.status,
                billing_subscription_id = EXCLUDED.billing_subscription_id,
                billing_customer_id = EXCLUDED.billing_customer_id,
                current_period_end = EXCLUDED.current_period_end,
                trial_end_date = EXCLUDED.trial_end_date,
                cancel_at = EXCLUDED.cancel_at,
                admin_override = EXCLUDED.admin_override,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(record.account_id)
        .bind(record.status)
        .bind(&record.billing_subscription_id)
        .bind(&record.billing_customer_id)
        .bind(record.current_period_end)
        .bind(record.trial_end_date)
        .bind(record.cancel_at)
        .bind(record.admin_override)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(())
    }

    async fn list_by_status(
        &self,
        status: SubscriptionStatus,
    ) -> AppResult<Vec<SubscriptionRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM subscriptions WHERE status = $1 ORDER BY updated_at DESC",
            SELECT_COLS
        ))
        .bind(status)
        .fetch_all(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(rows.iter().map(row_to_record).collect())
    }
}
