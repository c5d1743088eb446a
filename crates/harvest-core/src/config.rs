use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Typed per-scraper configuration, validated at load time.
///
/// Unknown fields are rejected so a typo in the config file fails fast
/// instead of silently changing behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScraperConfig {
    /// Root key prefix for uploaded objects (e.g. "mdpi/remote-sensing").
    pub bucket_key: String,

    /// Listing page to scrape for links. Absent for direct-URL scrapers.
    #[serde(default)]
    pub base_url: Option<String>,

    /// CSS selector for anchors to collect from the listing page.
    #[serde(default)]
    pub link_selector: Option<String>,

    /// Explicit resource URLs; when set, no listing page is fetched.
    #[serde(default)]
    pub urls: Vec<String>,

    /// CSS selector for the cookie-banner accept button, if the site has one.
    #[serde(default)]
    pub cookie_selector: Option<String>,

    /// Cap on resources taken from a single listing request.
    #[serde(default)]
    pub files_by_request: Option<usize>,

    /// File extension used in derived storage keys.
    #[serde(default = "default_extension")]
    pub file_extension: String,
}

fn default_extension() -> String {
    "pdf".to_string()
}

impl ScraperConfig {
    /// A scraper must either enumerate `urls` directly or provide a
    /// listing page plus a selector to extract links from it.
    pub fn validate(&self, name: &str) -> Result<(), AppError> {
        if self.bucket_key.trim().is_empty() {
            return Err(AppError::ConfigError(format!(
                "scraper '{name}': bucket_key must not be empty"
            )));
        }
        if self.urls.is_empty() {
            if self.base_url.is_none() {
                return Err(AppError::ConfigError(format!(
                    "scraper '{name}': either urls or base_url is required"
                )));
            }
            if self.link_selector.is_none() {
                return Err(AppError::ConfigError(format!(
                    "scraper '{name}': link_selector is required with base_url"
                )));
            }
        }
        Ok(())
    }
}

/// Load and validate the `{name: config}` map from a JSON file.
///
/// `BTreeMap` keeps scraper iteration order stable across runs.
pub fn load_scraper_configs(path: &Path) -> Result<BTreeMap<String, ScraperConfig>, AppError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        AppError::ConfigError(format!("Failed to read config file {}: {e}", path.display()))
    })?;

    let configs: BTreeMap<String, ScraperConfig> = serde_json::from_str(&raw).map_err(|e| {
        AppError::ConfigError(format!("Invalid JSON in {}: {e}", path.display()))
    })?;

    for (name, config) in &configs {
        config.validate(name)?;
    }

    Ok(configs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_config(
            r##"{
                "mdpi": {
                    "bucket_key": "mdpi/remote-sensing",
                    "base_url": "https://www.mdpi.com/2072-4292/1/1",
                    "link_selector": "a.UD_Listings_ArticlePDF",
                    "cookie_selector": "#accept-cookies"
                },
                "nasa": {
                    "bucket_key": "nasa/earthdata",
                    "urls": ["https://example.org/a.pdf", "https://example.org/b.pdf"],
                    "file_extension": "pdf"
                }
            }"##,
        );

        let configs = load_scraper_configs(file.path()).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs["mdpi"].bucket_key, "mdpi/remote-sensing");
        assert_eq!(configs["nasa"].urls.len(), 2);
        assert_eq!(configs["nasa"].file_extension, "pdf");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let file = write_config(
            r#"{"x": {"bucket_key": "k", "urls": ["u"], "not_a_field": true}}"#,
        );
        let err = load_scraper_configs(file.path()).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_missing_source_rejected() {
        let file = write_config(r#"{"x": {"bucket_key": "k"}}"#);
        let err = load_scraper_configs(file.path()).unwrap_err();
        assert!(err.to_string().contains("urls or base_url"));
    }

    #[test]
    fn test_selector_required_with_base_url() {
        let file = write_config(r#"{"x": {"bucket_key": "k", "base_url": "https://e.com"}}"#);
        let err = load_scraper_configs(file.path()).unwrap_err();
        assert!(err.to_string().contains("link_selector"));
    }

    #[test]
    fn test_empty_bucket_key_rejected() {
        let file = write_config(r#"{"x": {"bucket_key": "  ", "urls": ["u"]}}"#);
        assert!(load_scraper_configs(file.path()).is_err());
    }
}
