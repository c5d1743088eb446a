use std::fmt;

use crate::error::AppError;

/// Resolved execution intent for one invocation, derived from CLI flags.
///
/// Exactly one directive is active per scraper per invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDirective {
    /// Scrape anew and process every discovered resource.
    Fresh,
    /// Like `Fresh`, but bypasses the per-scraper "already done" marker
    /// and reprocesses every resource from scratch (full overwrite).
    Force,
    /// Reuse the last scrape's resource list; finish whatever is incomplete.
    Resume,
    /// Reuse the last scrape's resource list; retry failed uploads only.
    ResumeUpload,
    /// No stage work; render the latest persisted run summary.
    AnalyticsOnly,
}

impl RunDirective {
    /// Resolve a directive from raw CLI flags.
    ///
    /// `--resume` and `--resume-upload` are mutually exclusive, as is
    /// `--force` with either of them; conflicts are rejected here, before
    /// any work starts.
    pub fn resolve(
        force: bool,
        resume: bool,
        resume_upload: bool,
        analytics_only: bool,
    ) -> Result<Self, AppError> {
        if resume && resume_upload {
            return Err(AppError::ConfigError(
                "--resume and --resume-upload cannot be combined".into(),
            ));
        }
        if force && (resume || resume_upload) {
            return Err(AppError::ConfigError(
                "--force cannot be combined with --resume or --resume-upload".into(),
            ));
        }
        if analytics_only && (force || resume || resume_upload) {
            return Err(AppError::ConfigError(
                "--analytics-only cannot be combined with other run modes".into(),
            ));
        }

        Ok(if analytics_only {
            RunDirective::AnalyticsOnly
        } else if force {
            RunDirective::Force
        } else if resume {
            RunDirective::Resume
        } else if resume_upload {
            RunDirective::ResumeUpload
        } else {
            RunDirective::Fresh
        })
    }

    /// True when this directive starts with a fresh `scrape()` call.
    pub fn requires_scrape(&self) -> bool {
        matches!(self, RunDirective::Fresh | RunDirective::Force)
    }
}

impl fmt::Display for RunDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunDirective::Fresh => "fresh",
            RunDirective::Force => "force",
            RunDirective::Resume => "resume",
            RunDirective::ResumeUpload => "resume-upload",
            RunDirective::AnalyticsOnly => "analytics-only",
        };
        write!(f, "{s}")
    }
}

/// Per-scraper run state machine.
///
/// `Completed` and `Failed` are terminal; `Failed` is reached only when the
/// SCRAPE stage itself fails. Per-resource failures do not fail the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Scraping,
    Processing,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::NotStarted => "not_started",
            RunState::Scraping => "scraping",
            RunState::Processing => "processing",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_fresh() {
        let d = RunDirective::resolve(false, false, false, false).unwrap();
        assert_eq!(d, RunDirective::Fresh);
    }

    #[test]
    fn test_each_flag_resolves() {
        assert_eq!(
            RunDirective::resolve(true, false, false, false).unwrap(),
            RunDirective::Force
        );
        assert_eq!(
            RunDirective::resolve(false, true, false, false).unwrap(),
            RunDirective::Resume
        );
        assert_eq!(
            RunDirective::resolve(false, false, true, false).unwrap(),
            RunDirective::ResumeUpload
        );
        assert_eq!(
            RunDirective::resolve(false, false, false, true).unwrap(),
            RunDirective::AnalyticsOnly
        );
    }

    #[test]
    fn test_resume_and_resume_upload_conflict() {
        let err = RunDirective::resolve(false, true, true, false).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn test_force_conflicts_with_resume() {
        assert!(RunDirective::resolve(true, true, false, false).is_err());
        assert!(RunDirective::resolve(true, false, true, false).is_err());
    }

    #[test]
    fn test_analytics_only_is_exclusive() {
        assert!(RunDirective::resolve(true, false, false, true).is_err());
        assert!(RunDirective::resolve(false, true, false, true).is_err());
    }

    #[test]
    fn test_requires_scrape() {
        assert!(RunDirective::Fresh.requires_scrape());
        assert!(RunDirective::Force.requires_scrape());
        assert!(!RunDirective::Resume.requires_scrape());
        assert!(!RunDirective::ResumeUpload.requires_scrape());
        assert!(!RunDirective::AnalyticsOnly.requires_scrape());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!RunState::NotStarted.is_terminal());
        assert!(!RunState::Scraping.is_terminal());
        assert!(!RunState::Processing.is_terminal());
        assert!(RunState::Completed.is_terminal());
        assert!(RunState::Failed.is_terminal());
    }
}
