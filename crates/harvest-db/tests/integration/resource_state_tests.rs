use harvest_core::error::AppError;
use harvest_core::resource::{Stage, StageOutcome, StageStatus};
use harvest_core::state::{StageStatusFilter, StateStore};
use harvest_db::ResourceRepository;

use crate::integration::common::setup_test_db;

#[tokio::test]
async fn upsert_creates_and_get_reads_back() {
    let (pool, _container) = setup_test_db().await;
    let repo = ResourceRepository::new(pool);

    repo.upsert("mdpi", "https://e.com/a.pdf", Stage::Scrape, StageOutcome::success())
        .await
        .unwrap();

    let record = repo
        .get("mdpi", "https://e.com/a.pdf")
        .await
        .unwrap()
        .expect("record should exist");

    assert_eq!(record.scraper_name, "mdpi");
    assert_eq!(record.scrape.status, StageStatus::Success);
    assert_eq!(record.retrieve.status, StageStatus::NotAttempted);
    assert_eq!(record.upload.status, StageStatus::NotAttempted);
}

#[tokio::test]
async fn upsert_is_monotonic_per_stage() {
    let (pool, _container) = setup_test_db().await;
    let repo = ResourceRepository::new(pool);

    let url = "https://e.com/a.pdf";
    repo.upsert("mdpi", url, Stage::Scrape, StageOutcome::success())
        .await
        .unwrap();
    repo.upsert("mdpi", url, Stage::Retrieve, StageOutcome::failed("timeout"))
        .await
        .unwrap();

    // Later success supersedes the failure.
    repo.upsert("mdpi", url, Stage::Retrieve, StageOutcome::success())
        .await
        .unwrap();

    let record = repo.get("mdpi", url).await.unwrap().unwrap();
    assert!(record.retrieved());
    assert!(record.retrieve.error_detail.is_none());
}

#[tokio::test]
async fn upload_success_without_retrieve_is_rejected() {
    let (pool, _container) = setup_test_db().await;
    let repo = ResourceRepository::new(pool);

    let url = "https://e.com/a.pdf";
    repo.upsert("mdpi", url, Stage::Scrape, StageOutcome::success())
        .await
        .unwrap();

    let err = repo
        .upsert("mdpi", url, Stage::Upload, StageOutcome::success())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::StateViolation { .. }));

    // The rejected update left the row untouched.
    let record = repo.get("mdpi", url).await.unwrap().unwrap();
    assert_eq!(record.upload.status, StageStatus::NotAttempted);
}

#[tokio::test]
async fn upload_failure_is_recordable_any_time() {
    let (pool, _container) = setup_test_db().await;
    let repo = ResourceRepository::new(pool);

    let url = "https://e.com/a.pdf";
    repo.upsert("mdpi", url, Stage::Scrape, StageOutcome::success())
        .await
        .unwrap();
    repo.upsert("mdpi", url, Stage::Upload, StageOutcome::failed("denied"))
        .await
        .unwrap();

    let record = repo.get("mdpi", url).await.unwrap().unwrap();
    assert_eq!(record.upload.status, StageStatus::Failed);
    assert_eq!(record.upload.error_detail.as_deref(), Some("denied"));
}

#[tokio::test]
async fn list_filters_by_stage_status_and_scopes_by_scraper() {
    let (pool, _container) = setup_test_db().await;
    let repo = ResourceRepository::new(pool);

    for (scraper, url) in [
        ("mdpi", "https://e.com/a.pdf"),
        ("mdpi", "https://e.com/b.pdf"),
        ("arxiv", "https://e.com/c.pdf"),
    ] {
        repo.upsert(scraper, url, Stage::Scrape, StageOutcome::success())
            .await
            .unwrap();
    }
    repo.upsert("mdpi", "https://e.com/a.pdf", Stage::Retrieve, StageOutcome::failed("timeout"))
        .await
        .unwrap();
    repo.upsert("mdpi", "https://e.com/b.pdf", Stage::Retrieve, StageOutcome::success())
        .await
        .unwrap();

    let all = repo.list("mdpi", StageStatusFilter::All).await.unwrap();
    assert_eq!(all.len(), 2);

    let failed = repo
        .list(
            "mdpi",
            StageStatusFilter::Stage(Stage::Retrieve, StageStatus::Failed),
        )
        .await
        .unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].url, "https://e.com/a.pdf");

    // Other scrapers' rows never leak into the listing.
    let other = repo.list("arxiv", StageStatusFilter::All).await.unwrap();
    assert_eq!(other.len(), 1);
}

#[tokio::test]
async fn concurrent_upserts_on_distinct_urls() {
    let (pool, _container) = setup_test_db().await;
    let repo = ResourceRepository::new(pool);

    let mut handles = Vec::new();
    for i in 0..8 {
        let repo = repo.clone();
        handles.push(tokio::spawn(async move {
            let url = format!("https://e.com/{i}.pdf");
            repo.upsert("mdpi", &url, Stage::Scrape, StageOutcome::success())
                .await
                .unwrap();
            repo.upsert("mdpi", &url, Stage::Retrieve, StageOutcome::success())
                .await
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let all = repo.list("mdpi", StageStatusFilter::All).await.unwrap();
    assert_eq!(all.len(), 8);
    assert!(all.iter().all(|r| r.retrieved()));
}
