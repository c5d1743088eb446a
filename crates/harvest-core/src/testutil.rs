//! Test utilities: mock implementations of all core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::analytics::RunSummary;
use crate::error::AppError;
use crate::resource::{ResourceRecord, Stage, StageOutcome};
use crate::state::{StageStatusFilter, StateStore, SummaryStore};
use crate::traits::{Fetcher, ObjectStore, ScraperPlugin};

// ---------------------------------------------------------------------------
// MockPlugin
// ---------------------------------------------------------------------------

/// Mock scraper plugin returning a configurable URL list or a scrape error.
#[derive(Clone)]
pub struct MockPlugin {
    name: String,
    urls: Vec<String>,
    scrape_error: Arc<Mutex<Option<String>>>,
    pub scrape_calls: Arc<Mutex<u64>>,
}

impl MockPlugin {
    pub fn new(name: &str, urls: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            urls: urls.iter().map(|u| u.to_string()).collect(),
            scrape_error: Arc::new(Mutex::new(None)),
            scrape_calls: Arc::new(Mutex::new(0)),
        }
    }

    /// Plugin whose discovery stage always fails.
    pub fn failing(name: &str, error: &str) -> Self {
        Self {
            name: name.to_string(),
            urls: Vec::new(),
            scrape_error: Arc::new(Mutex::new(Some(error.to_string()))),
            scrape_calls: Arc::new(Mutex::new(0)),
        }
    }

    pub fn scrape_call_count(&self) -> u64 {
        *self.scrape_calls.lock().unwrap()
    }
}

impl ScraperPlugin for MockPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scrape(&self) -> Result<Vec<String>, AppError> {
        *self.scrape_calls.lock().unwrap() += 1;
        if let Some(msg) = self.scrape_error.lock().unwrap().clone() {
            return Err(AppError::ScrapeError(msg));
        }
        Ok(self.urls.clone())
    }

    fn post_process(&self, raw: Vec<String>) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        raw.into_iter().filter(|u| seen.insert(u.clone())).collect()
    }
}

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher returning fixed bytes, with optional per-URL failures.
#[derive(Clone)]
pub struct MockFetcher {
    default_body: Vec<u8>,
    url_errors: Arc<Mutex<HashMap<String, String>>>,
    error: Arc<Mutex<Option<AppError>>>,
    /// Every URL passed to `fetch`, in call order.
    pub fetched: Arc<Mutex<Vec<String>>>,
}

impl MockFetcher {
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            default_body: body,
            url_errors: Arc::new(Mutex::new(HashMap::new())),
            error: Arc::new(Mutex::new(None)),
            fetched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fetcher whose next call returns the given error.
    pub fn with_error(error: AppError) -> Self {
        Self {
            default_body: Vec::new(),
            url_errors: Arc::new(Mutex::new(HashMap::new())),
            error: Arc::new(Mutex::new(Some(error))),
            fetched: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Make fetches of `url` fail with an HTTP error carrying `detail`.
    pub fn fail_url(self, url: &str, detail: &str) -> Self {
        self.url_errors
            .lock()
            .unwrap()
            .insert(url.to_string(), detail.to_string());
        self
    }

    pub fn fetched_urls(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError> {
        self.fetched.lock().unwrap().push(url.to_string());
        if let Some(e) = self.error.lock().unwrap().take() {
            return Err(e);
        }
        if let Some(detail) = self.url_errors.lock().unwrap().get(url) {
            return Err(AppError::HttpError(detail.clone()));
        }
        Ok(self.default_body.clone())
    }
}

// ---------------------------------------------------------------------------
// MockObjectStore
// ---------------------------------------------------------------------------

/// In-memory object store recording puts; overwrites in place like S3.
#[derive(Clone)]
pub struct MockObjectStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    puts: Arc<Mutex<u64>>,
    put_error: Arc<Mutex<Option<AppError>>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self {
            objects: Arc::new(Mutex::new(HashMap::new())),
            puts: Arc::new(Mutex::new(0)),
            put_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Store whose next put returns the given error.
    pub fn with_put_error(error: AppError) -> Self {
        let store = Self::new();
        *store.put_error.lock().unwrap() = Some(error);
        store
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn put_count(&self) -> u64 {
        *self.puts.lock().unwrap()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }
}

impl Default for MockObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for MockObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<(), AppError> {
        if let Some(e) = self.put_error.lock().unwrap().take() {
            return Err(e);
        }
        *self.puts.lock().unwrap() += 1;
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, AppError> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }
}

// ---------------------------------------------------------------------------
// MemoryStateStore
// ---------------------------------------------------------------------------

/// In-memory [`StateStore`] enforcing the same monotonic-upsert invariant
/// as the real repository.
#[derive(Clone)]
pub struct MemoryStateStore {
    records: Arc<Mutex<HashMap<(String, String), ResourceRecord>>>,
    upserts: Arc<Mutex<u64>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
            upserts: Arc::new(Mutex::new(0)),
        }
    }

    /// Seed a pre-existing record, bypassing the upsert counter.
    pub fn seed(&self, record: ResourceRecord) {
        self.records.lock().unwrap().insert(
            (record.scraper_name.clone(), record.url.clone()),
            record,
        );
    }

    pub fn upsert_count(&self) -> u64 {
        *self.upserts.lock().unwrap()
    }

    pub fn record(&self, scraper_name: &str, url: &str) -> Option<ResourceRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&(scraper_name.to_string(), url.to_string()))
            .cloned()
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StateStore for MemoryStateStore {
    async fn get(&self, scraper_name: &str, url: &str) -> Result<Option<ResourceRecord>, AppError> {
        Ok(self.record(scraper_name, url))
    }

    async fn list(
        &self,
        scraper_name: &str,
        filter: StageStatusFilter,
    ) -> Result<Vec<ResourceRecord>, AppError> {
        let records = self.records.lock().unwrap();
        let mut matched: Vec<ResourceRecord> = records
            .values()
            .filter(|r| r.scraper_name == scraper_name && filter.matches(r))
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(matched)
    }

    async fn upsert(
        &self,
        scraper_name: &str,
        url: &str,
        stage: Stage,
        outcome: StageOutcome,
    ) -> Result<(), AppError> {
        let mut records = self.records.lock().unwrap();
        let key = (scraper_name.to_string(), url.to_string());
        let record = records.entry(key).or_insert_with(|| ResourceRecord {
            scraper_name: scraper_name.to_string(),
            url: url.to_string(),
            discovered_at: Utc::now(),
            scrape: StageOutcome::not_attempted(),
            retrieve: StageOutcome::not_attempted(),
            upload: StageOutcome::not_attempted(),
        });
        record.apply(stage, outcome)?;
        *self.upserts.lock().unwrap() += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemorySummaryStore
// ---------------------------------------------------------------------------

/// In-memory [`SummaryStore`]; latest = most recently saved per scraper.
#[derive(Clone, Default)]
pub struct MemorySummaryStore {
    summaries: Arc<Mutex<Vec<RunSummary>>>,
}

impl MemorySummaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with one summary (marks the scraper "done").
    pub fn with_summary(summary: RunSummary) -> Self {
        let store = Self::new();
        store.summaries.lock().unwrap().push(summary);
        store
    }

    pub fn saved_count(&self) -> usize {
        self.summaries.lock().unwrap().len()
    }
}

impl SummaryStore for MemorySummaryStore {
    async fn save(&self, summary: &RunSummary) -> Result<(), AppError> {
        self.summaries.lock().unwrap().push(summary.clone());
        Ok(())
    }

    async fn latest(&self, scraper_name: &str) -> Result<Option<RunSummary>, AppError> {
        Ok(self
            .summaries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.scraper_name == scraper_name)
            .cloned())
    }
}

// ---------------------------------------------------------------------------
// CollectingReporter
// ---------------------------------------------------------------------------

/// Run reporter that records event labels for assertions.
#[derive(Default)]
pub struct CollectingReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn labels(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }
}

impl crate::orchestrator::RunReporter for CollectingReporter {
    fn report(&self, event: crate::orchestrator::RunEvent<'_>) {
        use crate::orchestrator::RunEvent;
        let label = match &event {
            RunEvent::ScraperStarted { .. } => "ScraperStarted",
            RunEvent::ScraperSkipped { .. } => "ScraperSkipped",
            RunEvent::ScrapeCompleted { .. } => "ScrapeCompleted",
            RunEvent::ScrapeFailed { .. } => "ScrapeFailed",
            RunEvent::WorklistBuilt { .. } => "WorklistBuilt",
            RunEvent::StageCompleted { .. } => "StageCompleted",
            RunEvent::StageFailed { .. } => "StageFailed",
            RunEvent::Cancelled { .. } => "Cancelled",
            RunEvent::ScraperCompleted { .. } => "ScraperCompleted",
            RunEvent::AnalyticsReady { .. } => "AnalyticsReady",
            RunEvent::NoPriorRun { .. } => "NoPriorRun",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// A record with retrieve and upload both successful.
pub fn make_done_record(scraper_name: &str, url: &str) -> ResourceRecord {
    let mut record = ResourceRecord::discovered(scraper_name, url);
    record
        .apply(Stage::Retrieve, StageOutcome::success())
        .expect("retrieve after scrape");
    record
        .apply(Stage::Upload, StageOutcome::success())
        .expect("upload after retrieve");
    record
}

/// A record whose retrieve stage failed.
pub fn make_retrieve_failed_record(scraper_name: &str, url: &str, detail: &str) -> ResourceRecord {
    let mut record = ResourceRecord::discovered(scraper_name, url);
    record
        .apply(Stage::Retrieve, StageOutcome::failed(detail))
        .expect("failure is always recordable");
    record
}

/// A record retrieved successfully whose upload failed.
pub fn make_upload_failed_record(scraper_name: &str, url: &str, detail: &str) -> ResourceRecord {
    let mut record = ResourceRecord::discovered(scraper_name, url);
    record
        .apply(Stage::Retrieve, StageOutcome::success())
        .expect("retrieve after scrape");
    record
        .apply(Stage::Upload, StageOutcome::failed(detail))
        .expect("failure is always recordable");
    record
}
