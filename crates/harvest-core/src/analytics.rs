use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::resource::ResourceRecord;

/// Aggregate counters for one scraper's completed run.
///
/// Immutable once persisted; one row per `(scraper_name, run_id)`, stored
/// as a single JSON document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub scraper_name: String,
    pub run_id: Uuid,
    pub scraped: u64,
    pub retrieved_ok: u64,
    pub retrieved_failed: u64,
    pub uploaded_ok: u64,
    pub uploaded_failed: u64,
    pub created_at: DateTime<Utc>,
}

impl RunSummary {
    /// Count stage outcomes across a scraper's resource records.
    pub fn from_records(
        scraper_name: impl Into<String>,
        run_id: Uuid,
        records: &[ResourceRecord],
    ) -> Self {
        let mut summary = Self {
            scraper_name: scraper_name.into(),
            run_id,
            scraped: 0,
            retrieved_ok: 0,
            retrieved_failed: 0,
            uploaded_ok: 0,
            uploaded_failed: 0,
            created_at: Utc::now(),
        };

        for record in records {
            if record.scrape.is_success() {
                summary.scraped += 1;
            }
            match record.retrieve.status {
                crate::resource::StageStatus::Success => summary.retrieved_ok += 1,
                crate::resource::StageStatus::Failed => summary.retrieved_failed += 1,
                crate::resource::StageStatus::NotAttempted => {}
            }
            match record.upload.status {
                crate::resource::StageStatus::Success => summary.uploaded_ok += 1,
                crate::resource::StageStatus::Failed => summary.uploaded_failed += 1,
                crate::resource::StageStatus::NotAttempted => {}
            }
        }

        summary
    }
}
