use std::future::Future;

use crate::analytics::RunSummary;
use crate::error::AppError;
use crate::resource::{ResourceRecord, Stage, StageOutcome, StageStatus};

/// Filter for [`StateStore::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatusFilter {
    /// Every record for the scraper.
    All,
    /// Records whose given stage has the given status.
    Stage(Stage, StageStatus),
}

impl StageStatusFilter {
    pub fn matches(&self, record: &ResourceRecord) -> bool {
        match self {
            StageStatusFilter::All => true,
            StageStatusFilter::Stage(stage, status) => record.outcome(*stage).status == *status,
        }
    }
}

/// Durable record of per-resource pipeline progress.
///
/// Implementations must commit `upsert` synchronously before returning,
/// so a crash mid-run loses at most the in-flight resource. `upsert` must
/// be safe under concurrent calls for distinct `(scraper_name, url)` keys.
pub trait StateStore: Send + Sync + Clone {
    fn get(
        &self,
        scraper_name: &str,
        url: &str,
    ) -> impl Future<Output = Result<Option<ResourceRecord>, AppError>> + Send;

    /// Finite, re-queryable listing of a scraper's records.
    fn list(
        &self,
        scraper_name: &str,
        filter: StageStatusFilter,
    ) -> impl Future<Output = Result<Vec<ResourceRecord>, AppError>> + Send;

    /// Monotonic update: marking a stage SUCCESS while an earlier stage is
    /// not SUCCESS is a [`AppError::StateViolation`]. A later outcome for
    /// the same stage supersedes the previous one; records are never
    /// deleted during a run.
    fn upsert(
        &self,
        scraper_name: &str,
        url: &str,
        stage: Stage,
        outcome: StageOutcome,
    ) -> impl Future<Output = Result<(), AppError>> + Send;
}

/// Persistence for per-run summaries.
///
/// The latest summary for a scraper doubles as its "already done" marker:
/// a plain run skips scrapers that have one, `--force` bypasses it.
pub trait SummaryStore: Send + Sync + Clone {
    fn save(&self, summary: &RunSummary) -> impl Future<Output = Result<(), AppError>> + Send;

    fn latest(
        &self,
        scraper_name: &str,
    ) -> impl Future<Output = Result<Option<RunSummary>, AppError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_matches() {
        let mut record = ResourceRecord::discovered("mdpi", "https://e.com/a.pdf");
        record
            .apply(Stage::Retrieve, StageOutcome::failed("timeout"))
            .unwrap();

        assert!(StageStatusFilter::All.matches(&record));
        assert!(StageStatusFilter::Stage(Stage::Scrape, StageStatus::Success).matches(&record));
        assert!(StageStatusFilter::Stage(Stage::Retrieve, StageStatus::Failed).matches(&record));
        assert!(
            !StageStatusFilter::Stage(Stage::Upload, StageStatus::Success).matches(&record)
        );
    }
}
