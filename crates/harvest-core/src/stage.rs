use sha2::{Digest, Sha256};

use crate::error::AppError;
use crate::traits::{Fetcher, ObjectStore};

/// Derive the deterministic storage key for a resource.
///
/// The key depends only on `(scraper_name, url)`, so re-uploading the same
/// resource after a crash overwrites the same object instead of creating a
/// duplicate. A 32-hex-char digest prefix keeps keys short and collision-safe.
pub fn storage_key(bucket_key: &str, scraper_name: &str, url: &str, extension: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(scraper_name.as_bytes());
    hasher.update(b":");
    hasher.update(url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}/{}.{}", bucket_key.trim_end_matches('/'), &digest[..32], extension)
}

/// Executes exactly one pipeline stage for exactly one resource.
///
/// Generic over the external HTTP and storage collaborators via traits.
/// Every invocation is independent; a failure here never aborts siblings.
#[derive(Clone)]
pub struct StageRunner<F, O>
where
    F: Fetcher,
    O: ObjectStore,
{
    fetcher: F,
    store: O,
}

impl<F, O> StageRunner<F, O>
where
    F: Fetcher,
    O: ObjectStore,
{
    pub fn new(fetcher: F, store: O) -> Self {
        Self { fetcher, store }
    }

    /// RETRIEVE: fetch resource content. The error carries the proximate
    /// cause (non-2xx, timeout, connection failure) for `error_detail`.
    pub async fn retrieve(&self, url: &str) -> Result<Vec<u8>, AppError> {
        tracing::debug!(%url, "Retrieving resource content");
        let bytes = self.fetcher.fetch(url).await?;
        tracing::debug!(%url, size = bytes.len(), "Retrieved resource content");
        Ok(bytes)
    }

    /// UPLOAD: send already-retrieved content to object storage under the
    /// deterministic key. Overwrites on re-run — never a duplicate object.
    pub async fn upload(&self, key: &str, bytes: &[u8]) -> Result<(), AppError> {
        if self.store.exists(key).await? {
            tracing::debug!(%key, "Object already present, overwriting in place");
        }
        self.store.put(key, bytes).await?;
        tracing::debug!(%key, size = bytes.len(), "Uploaded object");
        Ok(())
    }
}
