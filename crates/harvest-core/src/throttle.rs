//! Per-domain delays between retrievals so resumable batch runs do not
//! hammer a publisher's site. Most worklists concentrate many URLs on one
//! host, so the delay is tracked per domain, not globally.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use url::Url;

use crate::error::AppError;
use crate::traits::Fetcher;

/// Configuration for the throttled fetcher.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    /// Minimum delay between consecutive requests to the same domain.
    pub delay: Duration,
    /// Maximum random jitter added on top of `delay` (uniform [0, jitter]).
    pub jitter: Duration,
}

impl ThrottleConfig {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            jitter: Duration::ZERO,
        }
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    fn effective_delay(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        self.delay + Duration::from_millis(jitter_ms(self.jitter.as_millis() as u64))
    }
}

impl Default for ThrottleConfig {
    /// 2s delay with up to 3s jitter, matching polite crawl pacing.
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(2),
            jitter: Duration::from_secs(3),
        }
    }
}

/// A [`Fetcher`] wrapper enforcing per-domain request pacing.
///
/// Safe under concurrent workers: the last-request map is shared, and the
/// lock is dropped while sleeping so other domains are not blocked.
#[derive(Clone)]
pub struct ThrottledFetcher<F> {
    inner: F,
    config: ThrottleConfig,
    last_request: Arc<Mutex<HashMap<String, Instant>>>,
}

impl<F: Fetcher> ThrottledFetcher<F> {
    pub fn new(inner: F, config: ThrottleConfig) -> Self {
        Self {
            inner,
            config,
            last_request: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn domain_key(url_str: &str) -> Option<String> {
        let url = Url::parse(url_str).ok()?;
        let host = url.host_str()?;
        Some(format!("{}://{}", url.scheme(), host))
    }

    async fn wait_for_domain(&self, domain: &str) {
        let mut map = self.last_request.lock().await;

        if let Some(&last) = map.get(domain) {
            let required = self.config.effective_delay();
            let elapsed = last.elapsed();
            if elapsed < required {
                let pause = required - elapsed;
                drop(map);
                tracing::debug!(%domain, pause_ms = %pause.as_millis(), "Throttling retrieval");
                tokio::time::sleep(pause).await;
                let mut map = self.last_request.lock().await;
                map.insert(domain.to_string(), Instant::now());
                return;
            }
        }
        map.insert(domain.to_string(), Instant::now());
    }
}

impl<F: Fetcher> Fetcher for ThrottledFetcher<F> {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, AppError> {
        if let Some(domain) = Self::domain_key(url) {
            self.wait_for_domain(&domain).await;
        }
        self.inner.fetch(url).await
    }
}

// Xorshift seeded from the clock — jitter does not need real randomness,
// and this avoids pulling in the `rand` crate.
fn jitter_ms(max_ms: u64) -> u64 {
    if max_ms == 0 {
        return 0;
    }
    let mut x = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    x ^= x << 13;
    x ^= x >> 7;
    x ^= x << 17;
    x % max_ms
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockFetcher;

    #[test]
    fn test_domain_key() {
        assert_eq!(
            ThrottledFetcher::<MockFetcher>::domain_key("https://example.com/a/b?q=1"),
            Some("https://example.com".to_string())
        );
        assert_eq!(ThrottledFetcher::<MockFetcher>::domain_key("not a url"), None);
    }

    #[test]
    fn test_effective_delay_bounds() {
        let config = ThrottleConfig::new(Duration::from_millis(100))
            .with_jitter(Duration::from_millis(50));
        for _ in 0..50 {
            let d = config.effective_delay();
            assert!(d >= Duration::from_millis(100));
            assert!(d < Duration::from_millis(150));
        }
    }

    #[tokio::test]
    async fn test_same_domain_is_delayed() {
        let fetcher = ThrottledFetcher::new(
            MockFetcher::new(b"ok".to_vec()),
            ThrottleConfig::new(Duration::from_millis(80)),
        );

        let start = Instant::now();
        fetcher.fetch("http://example.com/1.pdf").await.unwrap();
        fetcher.fetch("http://example.com/2.pdf").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(80));
    }

    #[tokio::test]
    async fn test_different_domains_are_independent() {
        let fetcher = ThrottledFetcher::new(
            MockFetcher::new(b"ok".to_vec()),
            ThrottleConfig::new(Duration::from_millis(200)),
        );

        let start = Instant::now();
        fetcher.fetch("http://example.com/1.pdf").await.unwrap();
        fetcher.fetch("http://other.com/1.pdf").await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_passes_through_errors() {
        let fetcher = ThrottledFetcher::new(
            MockFetcher::with_error(AppError::HttpError("fail".into())),
            ThrottleConfig::new(Duration::ZERO),
        );
        let err = fetcher.fetch("http://example.com").await.unwrap_err();
        assert!(matches!(err, AppError::HttpError(_)));
    }
}
