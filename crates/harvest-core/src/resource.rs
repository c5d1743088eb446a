use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// One of the three sequential pipeline phases a resource passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Scrape,
    Retrieve,
    Upload,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Scrape => "scrape",
            Stage::Retrieve => "retrieve",
            Stage::Upload => "upload",
        }
    }

    /// The stage that must be successful before this one may be attempted.
    pub fn prerequisite(&self) -> Option<Stage> {
        match self {
            Stage::Scrape => None,
            Stage::Retrieve => Some(Stage::Scrape),
            Stage::Upload => Some(Stage::Retrieve),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scrape" => Ok(Stage::Scrape),
            "retrieve" => Ok(Stage::Retrieve),
            "upload" => Ok(Stage::Upload),
            _ => Err(format!("Unknown stage: {}", s)),
        }
    }
}

/// Result status of one stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Success,
    Failed,
    NotAttempted,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Success => "success",
            StageStatus::Failed => "failed",
            StageStatus::NotAttempted => "not_attempted",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StageStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "success" => Ok(StageStatus::Success),
            "failed" => Ok(StageStatus::Failed),
            "not_attempted" => Ok(StageStatus::NotAttempted),
            _ => Err(format!("Unknown stage status: {}", s)),
        }
    }
}

/// Outcome of attempting one pipeline stage for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub status: StageStatus,
    pub attempted_at: Option<DateTime<Utc>>,
    /// Proximate cause, present only when `status` is `Failed`.
    pub error_detail: Option<String>,
}

impl StageOutcome {
    pub fn success() -> Self {
        Self {
            status: StageStatus::Success,
            attempted_at: Some(Utc::now()),
            error_detail: None,
        }
    }

    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Failed,
            attempted_at: Some(Utc::now()),
            error_detail: Some(detail.into()),
        }
    }

    pub fn not_attempted() -> Self {
        Self {
            status: StageStatus::NotAttempted,
            attempted_at: None,
            error_detail: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }
}

/// Persisted per-resource pipeline progress, keyed by `(scraper_name, url)`.
///
/// Owned by the state store; the orchestrator only holds transient views.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub scraper_name: String,
    pub url: String,
    pub discovered_at: DateTime<Utc>,
    pub scrape: StageOutcome,
    pub retrieve: StageOutcome,
    pub upload: StageOutcome,
}

impl ResourceRecord {
    /// A freshly discovered resource: scrape succeeded, nothing else attempted.
    pub fn discovered(scraper_name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            scraper_name: scraper_name.into(),
            url: url.into(),
            discovered_at: Utc::now(),
            scrape: StageOutcome::success(),
            retrieve: StageOutcome::not_attempted(),
            upload: StageOutcome::not_attempted(),
        }
    }

    pub fn outcome(&self, stage: Stage) -> &StageOutcome {
        match stage {
            Stage::Scrape => &self.scrape,
            Stage::Retrieve => &self.retrieve,
            Stage::Upload => &self.upload,
        }
    }

    pub fn retrieved(&self) -> bool {
        self.retrieve.is_success()
    }

    pub fn uploaded(&self) -> bool {
        self.upload.is_success()
    }

    /// True when the resource has passed every stage.
    pub fn fully_done(&self) -> bool {
        self.scrape.is_success() && self.retrieve.is_success() && self.upload.is_success()
    }

    /// Apply a new outcome for a stage, enforcing the prerequisite chain:
    /// a stage cannot be SUCCESS unless every preceding stage is SUCCESS.
    pub fn apply(&mut self, stage: Stage, outcome: StageOutcome) -> Result<(), AppError> {
        if outcome.status == StageStatus::Success {
            if let Some(prev) = stage.prerequisite() {
                if !self.outcome(prev).is_success() {
                    return Err(AppError::StateViolation {
                        scraper: self.scraper_name.clone(),
                        url: self.url.clone(),
                        stage,
                    });
                }
            }
        }

        match stage {
            Stage::Scrape => self.scrape = outcome,
            Stage::Retrieve => self.retrieve = outcome,
            Stage::Upload => self.upload = outcome,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_roundtrip() {
        for stage in [Stage::Scrape, Stage::Retrieve, Stage::Upload] {
            let parsed: Stage = stage.as_str().parse().unwrap();
            assert_eq!(parsed, stage);
        }
    }

    #[test]
    fn test_status_roundtrip() {
        for status in [
            StageStatus::Success,
            StageStatus::Failed,
            StageStatus::NotAttempted,
        ] {
            let parsed: StageStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_prerequisite_chain() {
        assert_eq!(Stage::Scrape.prerequisite(), None);
        assert_eq!(Stage::Retrieve.prerequisite(), Some(Stage::Scrape));
        assert_eq!(Stage::Upload.prerequisite(), Some(Stage::Retrieve));
    }

    #[test]
    fn test_apply_in_order() {
        let mut record = ResourceRecord::discovered("mdpi", "https://example.com/a.pdf");
        record
            .apply(Stage::Retrieve, StageOutcome::success())
            .unwrap();
        record.apply(Stage::Upload, StageOutcome::success()).unwrap();
        assert!(record.fully_done());
    }

    #[test]
    fn test_apply_upload_before_retrieve_is_violation() {
        let mut record = ResourceRecord::discovered("mdpi", "https://example.com/a.pdf");
        let err = record
            .apply(Stage::Upload, StageOutcome::success())
            .unwrap_err();
        assert!(matches!(err, AppError::StateViolation { stage: Stage::Upload, .. }));
        // Record untouched by the rejected update.
        assert_eq!(record.upload.status, StageStatus::NotAttempted);
    }

    #[test]
    fn test_apply_failure_allowed_out_of_order() {
        // Recording a FAILED upload without a successful retrieve is fine —
        // only SUCCESS is gated on the prerequisite chain.
        let mut record = ResourceRecord::discovered("mdpi", "https://example.com/a.pdf");
        record
            .apply(Stage::Upload, StageOutcome::failed("boom"))
            .unwrap();
        assert_eq!(record.upload.status, StageStatus::Failed);
        assert_eq!(record.upload.error_detail.as_deref(), Some("boom"));
    }

    #[test]
    fn test_later_success_supersedes_failure() {
        let mut record = ResourceRecord::discovered("mdpi", "https://example.com/a.pdf");
        record
            .apply(Stage::Retrieve, StageOutcome::failed("timeout"))
            .unwrap();
        record
            .apply(Stage::Retrieve, StageOutcome::success())
            .unwrap();
        assert!(record.retrieved());
        assert!(record.retrieve.error_detail.is_none());
    }
}
