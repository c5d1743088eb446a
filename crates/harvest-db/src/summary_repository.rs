use sqlx::{PgPool, Pool, Postgres};

use harvest_core::analytics::RunSummary;
use harvest_core::error::AppError;
use harvest_core::state::SummaryStore;

/// PostgreSQL-backed [`SummaryStore`].
///
/// Summaries are append-only: every completed run inserts a new row, and
/// `latest` answers both the analytics query and the "already done" check.
#[derive(Clone)]
pub struct SummaryRepository {
    pool: Pool<Postgres>,
}

impl SummaryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl SummaryStore for SummaryRepository {
    async fn save(&self, summary: &RunSummary) -> Result<(), AppError> {
        let payload = serde_json::to_value(summary)?;

        sqlx::query(
            r#"
            INSERT INTO scraper_run_summaries (scraper_name, run_id, summary, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(&summary.scraper_name)
        .bind(summary.run_id)
        .bind(payload)
        .bind(summary.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn latest(&self, scraper_name: &str) -> Result<Option<RunSummary>, AppError> {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            r#"
            SELECT summary
            FROM scraper_run_summaries
            WHERE scraper_name = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(scraper_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        match row {
            Some((payload,)) => Ok(Some(serde_json::from_value(payload)?)),
            None => Ok(None),
        }
    }
}
