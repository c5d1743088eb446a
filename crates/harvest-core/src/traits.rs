use std::future::Future;

use crate::error::AppError;

/// Capability a site scraper plugin must provide.
///
/// The orchestrator drives every plugin uniformly through this interface
/// and knows nothing about per-site logic. A `scrape()` error is treated
/// as a SCRAPE-stage failure for the whole scraper run, never per-resource.
pub trait ScraperPlugin: Send + Sync {
    /// Unique scraper name; also the state-store partition key.
    fn name(&self) -> &str;

    /// Discover candidate resource URLs (typically one paginated crawl).
    fn scrape(&self) -> impl Future<Output = Result<Vec<String>, AppError>> + Send;

    /// Transform raw scrape output into the final list of URLs to
    /// retrieve and upload (absolutise, dedupe, truncate).
    fn post_process(&self, raw: Vec<String>) -> Vec<String>;
}

/// Fetches raw resource content (RETRIEVE-stage I/O).
pub trait Fetcher: Send + Sync + Clone {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, AppError>> + Send;
}

/// Durable object storage (UPLOAD-stage I/O).
///
/// `put` must overwrite an existing object under the same key — that is
/// the idempotence guarantee that makes resumed runs safe to repeat.
pub trait ObjectStore: Send + Sync + Clone {
    fn put(
        &self,
        key: &str,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), AppError>> + Send;

    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, AppError>> + Send;
}
