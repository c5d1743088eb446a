use chrono::{DateTime, Utc};
use sqlx::{PgPool, Pool, Postgres};

use harvest_core::error::AppError;
use harvest_core::resource::{ResourceRecord, Stage, StageOutcome, StageStatus};
use harvest_core::state::{StageStatusFilter, StateStore};

/// PostgreSQL-backed [`StateStore`] keyed by `(scraper_name, url)`.
///
/// Upserts run inside a transaction with `SELECT ... FOR UPDATE`, so
/// concurrent workers on distinct resources never interleave on the same
/// row, and the prerequisite-chain invariant is checked against the row
/// as it exists at commit time.
#[derive(Clone)]
pub struct ResourceRepository {
    pool: Pool<Postgres>,
}

impl ResourceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct ResourceRow {
    scraper_name: String,
    url: String,
    discovered_at: DateTime<Utc>,
    scrape_status: String,
    scrape_attempted_at: Option<DateTime<Utc>>,
    scrape_error: Option<String>,
    retrieve_status: String,
    retrieve_attempted_at: Option<DateTime<Utc>>,
    retrieve_error: Option<String>,
    upload_status: String,
    upload_attempted_at: Option<DateTime<Utc>>,
    upload_error: Option<String>,
}

fn outcome_from_columns(
    status: &str,
    attempted_at: Option<DateTime<Utc>>,
    error: Option<String>,
) -> StageOutcome {
    StageOutcome {
        status: status.parse().unwrap_or(StageStatus::NotAttempted),
        attempted_at,
        error_detail: error,
    }
}

impl From<ResourceRow> for ResourceRecord {
    fn from(row: ResourceRow) -> Self {
        ResourceRecord {
            scraper_name: row.scraper_name,
            url: row.url,
            discovered_at: row.discovered_at,
            scrape: outcome_from_columns(
                &row.scrape_status,
                row.scrape_attempted_at,
                row.scrape_error,
            ),
            retrieve: outcome_from_columns(
                &row.retrieve_status,
                row.retrieve_attempted_at,
                row.retrieve_error,
            ),
            upload: outcome_from_columns(
                &row.upload_status,
                row.upload_attempted_at,
                row.upload_error,
            ),
        }
    }
}

const SELECT_COLUMNS: &str = r#"
    scraper_name, url, discovered_at,
    scrape_status, scrape_attempted_at, scrape_error,
    retrieve_status, retrieve_attempted_at, retrieve_error,
    upload_status, upload_attempted_at, upload_error
"#;

fn status_column(stage: Stage) -> &'static str {
    match stage {
        Stage::Scrape => "scrape_status",
        Stage::Retrieve => "retrieve_status",
        Stage::Upload => "upload_status",
    }
}

impl StateStore for ResourceRepository {
    async fn get(&self, scraper_name: &str, url: &str) -> Result<Option<ResourceRecord>, AppError> {
        let row = sqlx::query_as::<_, ResourceRow>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM scraper_resources
            WHERE scraper_name = $1 AND url = $2
            "#,
        ))
        .bind(scraper_name)
        .bind(url)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn list(
        &self,
        scraper_name: &str,
        filter: StageStatusFilter,
    ) -> Result<Vec<ResourceRecord>, AppError> {
        // The stage column name comes from a closed enum, never from input.
        let query = match filter {
            StageStatusFilter::All => format!(
                r#"
                SELECT {SELECT_COLUMNS}
                FROM scraper_resources
                WHERE scraper_name = $1
                ORDER BY url
                "#,
            ),
            StageStatusFilter::Stage(stage, _) => format!(
                r#"
                SELECT {SELECT_COLUMNS}
                FROM scraper_resources
                WHERE scraper_name = $1 AND {} = $2
                ORDER BY url
                "#,
                status_column(stage),
            ),
        };

        let mut q = sqlx::query_as::<_, ResourceRow>(&query).bind(scraper_name);
        if let StageStatusFilter::Stage(_, status) = filter {
            q = q.bind(status.as_str());
        }

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert(
        &self,
        scraper_name: &str,
        url: &str,
        stage: Stage,
        outcome: StageOutcome,
    ) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let existing = sqlx::query_as::<_, ResourceRow>(&format!(
            r#"
            SELECT {SELECT_COLUMNS}
            FROM scraper_resources
            WHERE scraper_name = $1 AND url = $2
            FOR UPDATE
            "#,
        ))
        .bind(scraper_name)
        .bind(url)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        let mut record = match existing {
            Some(row) => row.into(),
            None => ResourceRecord {
                scraper_name: scraper_name.to_string(),
                url: url.to_string(),
                discovered_at: Utc::now(),
                scrape: StageOutcome::not_attempted(),
                retrieve: StageOutcome::not_attempted(),
                upload: StageOutcome::not_attempted(),
            },
        };

        // Invariant check happens in the domain type, under the row lock.
        record.apply(stage, outcome)?;

        sqlx::query(
            r#"
            INSERT INTO scraper_resources (
                scraper_name, url, discovered_at,
                scrape_status, scrape_attempted_at, scrape_error,
                retrieve_status, retrieve_attempted_at, retrieve_error,
                upload_status, upload_attempted_at, upload_error
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (scraper_name, url) DO UPDATE SET
                scrape_status = EXCLUDED.scrape_status,
                scrape_attempted_at = EXCLUDED.scrape_attempted_at,
                scrape_error = EXCLUDED.scrape_error,
                retrieve_status = EXCLUDED.retrieve_status,
                retrieve_attempted_at = EXCLUDED.retrieve_attempted_at,
                retrieve_error = EXCLUDED.retrieve_error,
                upload_status = EXCLUDED.upload_status,
                upload_attempted_at = EXCLUDED.upload_attempted_at,
                upload_error = EXCLUDED.upload_error
            "#,
        )
        .bind(&record.scraper_name)
        .bind(&record.url)
        .bind(record.discovered_at)
        .bind(record.scrape.status.as_str())
        .bind(record.scrape.attempted_at)
        .bind(&record.scrape.error_detail)
        .bind(record.retrieve.status.as_str())
        .bind(record.retrieve.attempted_at)
        .bind(&record.retrieve.error_detail)
        .bind(record.upload.status.as_str())
        .bind(record.upload.attempted_at)
        .bind(&record.upload.error_detail)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}
