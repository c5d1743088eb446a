use harvest_core::config::ScraperConfig;
use harvest_core::error::AppError;
use harvest_core::traits::{Fetcher, ScraperPlugin};
use scraper::{Html, Selector};
use url::Url;

/// Config-driven site scraper.
///
/// Covers both scraper shapes the config file supports: an explicit URL
/// list, or a listing page crawled with a CSS selector. Site differences
/// live entirely in [`ScraperConfig`], so one type serves every site and
/// the orchestrator stays monomorphic over the plugin set.
#[derive(Clone)]
pub struct SitePlugin<F: Fetcher> {
    name: String,
    config: ScraperConfig,
    fetcher: F,
}

impl<F: Fetcher> SitePlugin<F> {
    pub fn new(name: impl Into<String>, config: ScraperConfig, fetcher: F) -> Self {
        Self {
            name: name.into(),
            config,
            fetcher,
        }
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    async fn scrape_listing(&self, base_url: &str, selector: &str) -> Result<Vec<String>, AppError> {
        if self.config.cookie_selector.is_some() {
            // Cookie banners only exist in a rendered browser; a plain
            // HTTP fetch sees the page without the overlay.
            tracing::debug!(scraper = %self.name, "cookie_selector configured, not needed for HTTP fetching");
        }

        let bytes = self
            .fetcher
            .fetch(base_url)
            .await
            .map_err(|e| AppError::ScrapeError(format!("listing fetch failed: {e}")))?;
        let html = String::from_utf8_lossy(&bytes);

        extract_links(&html, selector, base_url)
    }
}

impl<F: Fetcher> ScraperPlugin for SitePlugin<F> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn scrape(&self) -> Result<Vec<String>, AppError> {
        if !self.config.urls.is_empty() {
            tracing::debug!(
                scraper = %self.name,
                count = self.config.urls.len(),
                "Using configured URL list, no listing crawl"
            );
            return Ok(self.config.urls.clone());
        }

        // validate() guarantees both are present when urls is empty.
        let base_url = self
            .config
            .base_url
            .as_deref()
            .ok_or_else(|| AppError::ScrapeError("base_url missing".to_string()))?;
        let selector = self
            .config
            .link_selector
            .as_deref()
            .ok_or_else(|| AppError::ScrapeError("link_selector missing".to_string()))?;

        self.scrape_listing(base_url, selector).await
    }

    fn post_process(&self, raw: Vec<String>) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut urls: Vec<String> = raw
            .into_iter()
            .filter(|u| seen.insert(u.clone()))
            .collect();

        if let Some(cap) = self.config.files_by_request {
            urls.truncate(cap);
        }
        urls
    }
}

/// Extract anchor targets matching `selector` and absolutise them against
/// the listing page URL. Synchronous: the parsed DOM is not `Send` and
/// must not live across an await point.
fn extract_links(html: &str, selector: &str, base_url: &str) -> Result<Vec<String>, AppError> {
    let selector = Selector::parse(selector)
        .map_err(|e| AppError::ScrapeError(format!("invalid link_selector: {e}")))?;
    let base = Url::parse(base_url)
        .map_err(|e| AppError::ScrapeError(format!("invalid base_url: {e}")))?;

    let document = Html::parse_document(html);
    let mut links = Vec::new();
    for element in document.select(&selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        match base.join(href) {
            Ok(absolute) => links.push(absolute.to_string()),
            Err(e) => {
                tracing::warn!(%href, error = %e, "Skipping unparsable link");
            }
        }
    }
    Ok(links)
}
