use harvest_core::analytics::RunSummary;
use harvest_core::resource::{ResourceRecord, Stage, StageOutcome};
use harvest_core::state::SummaryStore;
use harvest_db::SummaryRepository;
use uuid::Uuid;

use crate::integration::common::setup_test_db;

fn summary_for(scraper: &str) -> RunSummary {
    let mut record = ResourceRecord::discovered(scraper, "https://e.com/a.pdf");
    record
        .apply(Stage::Retrieve, StageOutcome::success())
        .unwrap();
    record.apply(Stage::Upload, StageOutcome::success()).unwrap();

    RunSummary::from_records(scraper, Uuid::new_v4(), &[record])
}

#[tokio::test]
async fn save_and_load_latest() {
    let (pool, _container) = setup_test_db().await;
    let repo = SummaryRepository::new(pool);

    let summary = summary_for("mdpi");
    repo.save(&summary).await.unwrap();

    let latest = repo
        .latest("mdpi")
        .await
        .unwrap()
        .expect("summary should exist");
    assert_eq!(latest.run_id, summary.run_id);
    assert_eq!(latest.scraped, 1);
    assert_eq!(latest.uploaded_ok, 1);
}

#[tokio::test]
async fn latest_returns_most_recent_run() {
    let (pool, _container) = setup_test_db().await;
    let repo = SummaryRepository::new(pool);

    let first = summary_for("mdpi");
    repo.save(&first).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    let mut second = summary_for("mdpi");
    second.created_at = chrono::Utc::now();
    repo.save(&second).await.unwrap();

    let latest = repo.latest("mdpi").await.unwrap().unwrap();
    assert_eq!(latest.run_id, second.run_id);
}

#[tokio::test]
async fn latest_is_scoped_per_scraper() {
    let (pool, _container) = setup_test_db().await;
    let repo = SummaryRepository::new(pool);

    repo.save(&summary_for("mdpi")).await.unwrap();

    assert!(repo.latest("mdpi").await.unwrap().is_some());
    assert!(repo.latest("arxiv").await.unwrap().is_none());
}
