use async_trait::async_trait;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::entitlement::TrialPolicyRepo,
};

/// The policy lives in a single row keyed by `id = 1`.
#[async_trait]
impl TrialPolicyRepo for PostgresPersistence {
    async fn get_default_trial_days(&self) -> AppResult<u32> {
        let days: Option<i32> =
            sqlx::query_scalar("SELECT default_trial_days FROM trial_policy WHERE id = 1")
                .fetch_optional(self.pool())
                .await
                .map_err(AppError::from)?;

        let days = days.ok_or_else(|| AppError::Internal("Trial policy row missing".into()))?;
        u32::try_from(days)
            .map_err(|_| AppError::Internal(format!("Negative trial policy value: {days}")))
    }

    async fn set_default_trial_days(&self, days: u32) -> AppResult<()> {
        let days = i32::try_from(days)
            .map_err(|_| AppError::InvalidInput("Trial days out of range".into()))?;
        sqlx::query(
            r#"
            INSERT INTO trial_policy (id, default_trial_days)
            VALUES (1, $1)
            ON CONFLICT (id) DO UPDATE SET
                default_trial_days = EXCLUDED.default_trial_days,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(days)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(())
    }
}

impl PostgresPersistence {
    /// Insert the policy row if it does not exist yet. Never overwrites an
    /// administrator's value.
    pub async fn seed_trial_policy(&self, default_days: u32) -> AppResult<()> {
        let days = i32::try_from(default_days)
            .map_err(|_| AppError::InvalidInput("Trial days out of range".into()))?;
        sqlx::query(
            "INSERT INTO trial_policy (id, default_trial_days) VALUES (1, $1) ON CONFLICT (id) DO NOTHING",
        )
        .bind(days)
        .execute(self.pool())
        .await
        .map_err(AppError::from)?;
        Ok(())
    }
}
