//! # Settings Repository
//!
//! The single `store_settings` row (id = 1), seeded by the initial migration.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;

use crate::error::{DbError, DbResult};
use kassa_core::StoreSettings;

const SELECT_SETTINGS: &str = r#"
    SELECT low_stock_threshold_milli, bonus_percentage_bps, debt_reminder_days, updated_at
    FROM store_settings
    WHERE id = 1
"#;

#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    pub async fn get(&self) -> DbResult<StoreSettings> {
        let mut conn = self.pool.acquire().await?;
        Self::fetch(&mut conn).await
    }

    pub async fn fetch(conn: &mut SqliteConnection) -> DbResult<StoreSettings> {
        let settings = sqlx::query_as::<_, StoreSettings>(SELECT_SETTINGS)
            .fetch_optional(&mut *conn)
            .await?;
        settings.ok_or_else(|| DbError::not_found("StoreSettings", "1"))
    }

    pub async fn update(&self, settings: &StoreSettings) -> DbResult<StoreSettings> {
        info!(
            low_stock_threshold_milli = settings.low_stock_threshold_milli,
            bonus_percentage_bps = settings.bonus_percentage_bps,
            debt_reminder_days = settings.debt_reminder_days,
            "Updating store settings"
        );

        let now = Utc::now();
        sqlx::query(
            r#"
            UPDATE store_settings SET
                low_stock_threshold_milli = ?1,
                bonus_percentage_bps = ?2,
                debt_reminder_days = ?3,
                updated_at = ?4
            WHERE id = 1
            "#,
        )
        .bind(settings.low_stock_threshold_milli)
        .bind(settings.bonus_percentage_bps)
        .bind(settings.debt_reminder_days)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get().await
    }
}
