use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::analytics::RunSummary;
use crate::config::ScraperConfig;
use crate::directive::{RunDirective, RunState};
use crate::error::AppError;
use crate::policy::{plan, WorkPlan};
use crate::resource::{Stage, StageOutcome};
use crate::stage::{storage_key, StageRunner};
use crate::state::{StageStatusFilter, StateStore, SummaryStore};
use crate::traits::{Fetcher, ObjectStore, ScraperPlugin};

/// Events emitted by the orchestrator for monitoring/logging.
#[derive(Debug)]
pub enum RunEvent<'a> {
    ScraperStarted {
        scraper: &'a str,
        directive: RunDirective,
    },
    /// Fresh run skipped because the scraper already has a persisted summary.
    ScraperSkipped {
        scraper: &'a str,
    },
    ScrapeCompleted {
        scraper: &'a str,
        discovered: usize,
    },
    ScrapeFailed {
        scraper: &'a str,
        error: &'a str,
    },
    WorklistBuilt {
        scraper: &'a str,
        pending: usize,
    },
    StageCompleted {
        scraper: &'a str,
        url: &'a str,
        stage: Stage,
    },
    StageFailed {
        scraper: &'a str,
        url: &'a str,
        stage: Stage,
        error: &'a str,
    },
    Cancelled {
        scraper: &'a str,
    },
    ScraperCompleted {
        scraper: &'a str,
        summary: &'a RunSummary,
    },
    AnalyticsReady {
        summary: &'a RunSummary,
    },
    NoPriorRun {
        scraper: &'a str,
    },
}

/// Trait for receiving run events (decoupled logging).
pub trait RunReporter: Send + Sync {
    fn report(&self, event: RunEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRunReporter;

impl RunReporter for TracingRunReporter {
    fn report(&self, event: RunEvent<'_>) {
        match event {
            RunEvent::ScraperStarted { scraper, directive } => {
                tracing::info!(%scraper, %directive, "Scraper run started");
            }
            RunEvent::ScraperSkipped { scraper } => {
                tracing::warn!(%scraper, "Scraper already done, skipping (use --force to rerun)");
            }
            RunEvent::ScrapeCompleted { scraper, discovered } => {
                tracing::info!(%scraper, %discovered, "Scrape stage completed");
            }
            RunEvent::ScrapeFailed { scraper, error } => {
                tracing::error!(%scraper, %error, "Scrape stage failed, scraper run aborted");
            }
            RunEvent::WorklistBuilt { scraper, pending } => {
                tracing::info!(%scraper, %pending, "Worklist built");
            }
            RunEvent::StageCompleted { scraper, url, stage } => {
                tracing::info!(%scraper, %url, %stage, "Stage completed");
            }
            RunEvent::StageFailed {
                scraper,
                url,
                stage,
                error,
            } => {
                tracing::warn!(%scraper, %url, %stage, %error, "Stage failed, will surface for resume");
            }
            RunEvent::Cancelled { scraper } => {
                tracing::info!(%scraper, "Cancellation requested, draining in-flight work");
            }
            RunEvent::ScraperCompleted { scraper, summary } => {
                tracing::info!(
                    %scraper,
                    scraped = summary.scraped,
                    retrieved_ok = summary.retrieved_ok,
                    retrieved_failed = summary.retrieved_failed,
                    uploaded_ok = summary.uploaded_ok,
                    uploaded_failed = summary.uploaded_failed,
                    "Scraper run completed"
                );
            }
            RunEvent::AnalyticsReady { summary } => {
                tracing::info!(
                    scraper = %summary.scraper_name,
                    run_id = %summary.run_id,
                    "Latest run summary loaded"
                );
            }
            RunEvent::NoPriorRun { scraper } => {
                tracing::error!(%scraper, "No prior run summary for scraper");
            }
        }
    }
}

/// Orchestrator tuning knobs.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bounded worker pool size for per-resource stage work.
    pub workers: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self { workers: 4 }
    }
}

/// A resource-level failure surfaced in the final report, telling the
/// operator what a future `--resume` / `--resume-upload` will retry.
#[derive(Debug, Clone)]
pub struct FailedResource {
    pub url: String,
    pub stage: Stage,
    pub detail: String,
}

/// Terminal result of one scraper's run.
#[derive(Debug, Clone)]
pub struct ScraperRunOutcome {
    pub scraper_name: String,
    pub directive: RunDirective,
    pub state: RunState,
    pub summary: Option<RunSummary>,
    pub failed_resources: Vec<FailedResource>,
    /// Scrape-level failure detail, set only when `state` is `Failed`.
    pub error: Option<String>,
}

impl ScraperRunOutcome {
    pub fn completed(&self) -> bool {
        self.state == RunState::Completed
    }
}

/// Per-resource result handed back from a worker task.
struct ResourceResult {
    url: String,
    /// `(stage, None)` on success, `(stage, Some(detail))` on failure.
    outcomes: Vec<(Stage, Option<String>)>,
}

/// Top-level driver: runs each selected scraper through the
/// scrape → retrieve → upload pipeline as an independent state machine.
///
/// Generic over all external collaborators via traits, enabling dependency
/// injection and testability without real HTTP, storage, or database calls.
pub struct RunOrchestrator<F, O, S, Y>
where
    F: Fetcher + 'static,
    O: ObjectStore + 'static,
    S: StateStore + 'static,
    Y: SummaryStore,
{
    runner: StageRunner<F, O>,
    state: S,
    summaries: Y,
    config: OrchestratorConfig,
}

impl<F, O, S, Y> RunOrchestrator<F, O, S, Y>
where
    F: Fetcher + 'static,
    O: ObjectStore + 'static,
    S: StateStore + 'static,
    Y: SummaryStore,
{
    pub fn new(runner: StageRunner<F, O>, state: S, summaries: Y, config: OrchestratorConfig) -> Self {
        Self {
            runner,
            state,
            summaries,
            config,
        }
    }

    /// Run every scraper in turn. One scraper's failure never affects the
    /// others; only infrastructure errors (database) abort the invocation.
    pub async fn run_many<P, R>(
        &self,
        scrapers: &[(P, ScraperConfig)],
        directive: RunDirective,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<Vec<ScraperRunOutcome>, AppError>
    where
        P: ScraperPlugin,
        R: RunReporter,
    {
        let mut outcomes = Vec::with_capacity(scrapers.len());
        for (plugin, scraper_config) in scrapers {
            if cancel.is_cancelled() {
                break;
            }
            outcomes.push(
                self.run_scraper(plugin, scraper_config, directive, cancel, reporter)
                    .await?,
            );
        }
        Ok(outcomes)
    }

    /// Drive one scraper through its state machine:
    /// `NotStarted → Scraping → Processing → Completed | Failed`.
    pub async fn run_scraper<P, R>(
        &self,
        plugin: &P,
        scraper_config: &ScraperConfig,
        directive: RunDirective,
        cancel: &CancellationToken,
        reporter: &R,
    ) -> Result<ScraperRunOutcome, AppError>
    where
        P: ScraperPlugin,
        R: RunReporter,
    {
        let name = plugin.name();
        reporter.report(RunEvent::ScraperStarted {
            scraper: name,
            directive,
        });

        // Read-only path: no stage work, no state mutations.
        if directive == RunDirective::AnalyticsOnly {
            return match self.summaries.latest(name).await? {
                Some(summary) => {
                    reporter.report(RunEvent::AnalyticsReady { summary: &summary });
                    Ok(self.outcome(name, directive, RunState::Completed, Some(summary), vec![], None))
                }
                None => {
                    reporter.report(RunEvent::NoPriorRun { scraper: name });
                    Ok(self.outcome(
                        name,
                        directive,
                        RunState::Failed,
                        None,
                        vec![],
                        Some(format!("no prior run for scraper '{name}'")),
                    ))
                }
            };
        }

        // The latest persisted summary is the per-scraper "done" marker.
        // Plain runs skip such scrapers; Force bypasses the marker.
        if directive == RunDirective::Fresh {
            if let Some(summary) = self.summaries.latest(name).await? {
                reporter.report(RunEvent::ScraperSkipped { scraper: name });
                return Ok(self.outcome(
                    name,
                    directive,
                    RunState::Completed,
                    Some(summary),
                    vec![],
                    None,
                ));
            }
        }

        // Resume modes reuse the last scrape's resource list. A fresh
        // scrape happens when the directive demands it, or under Resume
        // when there is nothing to resume from yet. ResumeUpload never
        // scrapes; with no prior state it has nothing it could upload.
        let mut prior_records = Vec::new();
        let needs_scrape = directive.requires_scrape() || {
            prior_records = self.state.list(name, StageStatusFilter::All).await?;
            prior_records.is_empty() && directive == RunDirective::Resume
        };

        if !needs_scrape && prior_records.is_empty() {
            reporter.report(RunEvent::NoPriorRun { scraper: name });
            return Ok(self.outcome(
                name,
                directive,
                RunState::Failed,
                None,
                vec![],
                Some(format!(
                    "no prior resources for scraper '{name}'; nothing to resume"
                )),
            ));
        }

        let worklist: Vec<(String, WorkPlan)> = if needs_scrape {
            let raw = match plugin.scrape().await {
                Ok(raw) => raw,
                Err(e) => {
                    let detail = e.to_string();
                    reporter.report(RunEvent::ScrapeFailed {
                        scraper: name,
                        error: &detail,
                    });
                    return Ok(self.outcome(
                        name,
                        directive,
                        RunState::Failed,
                        None,
                        vec![],
                        Some(detail),
                    ));
                }
            };

            // Exactly one record (and one in-flight task) per (scraper, url),
            // whatever the plugin's post_process returned.
            let mut seen = HashSet::new();
            let urls: Vec<String> = plugin
                .post_process(raw)
                .into_iter()
                .filter(|url| seen.insert(url.clone()))
                .collect();
            reporter.report(RunEvent::ScrapeCompleted {
                scraper: name,
                discovered: urls.len(),
            });

            // Durable scrape-stage success per discovered resource, before
            // any retrieval starts.
            for url in &urls {
                self.state
                    .upsert(name, url, Stage::Scrape, StageOutcome::success())
                    .await?;
            }

            urls.into_iter()
                .filter_map(|url| plan(directive, None).map(|work| (url, work)))
                .collect()
        } else {
            prior_records
                .into_iter()
                .filter_map(|record| plan(directive, Some(&record)).map(|work| (record.url, work)))
                .collect()
        };

        reporter.report(RunEvent::WorklistBuilt {
            scraper: name,
            pending: worklist.len(),
        });

        let mut failed_resources = Vec::new();
        let mut cancelled = false;

        // Bounded fan-out. Each (scraper, url) is owned by exactly one
        // in-flight task; the permit caps concurrency.
        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut tasks: JoinSet<ResourceResult> = JoinSet::new();

        for (url, work) in worklist {
            if cancel.is_cancelled() {
                cancelled = true;
                reporter.report(RunEvent::Cancelled { scraper: name });
                break;
            }

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            let runner = self.runner.clone();
            let state = self.state.clone();
            let scraper = name.to_string();
            let key = storage_key(
                &scraper_config.bucket_key,
                name,
                &url,
                &scraper_config.file_extension,
            );
            tasks.spawn(async move {
                let _permit = permit;
                process_resource(runner, state, scraper, url, work, key).await
            });

            while let Some(joined) = tasks.try_join_next() {
                absorb_result(joined, name, reporter, &mut failed_resources);
            }
        }

        // No hard kill: in-flight stage work runs to its terminal outcome
        // even after cancellation, keeping the store cleanly resumable.
        while let Some(joined) = tasks.join_next().await {
            absorb_result(joined, name, reporter, &mut failed_resources);
        }

        if cancelled {
            // Interrupted mid-processing: no summary, run stays non-terminal.
            return Ok(self.outcome(
                name,
                directive,
                RunState::Processing,
                None,
                failed_resources,
                None,
            ));
        }

        let records = self.state.list(name, StageStatusFilter::All).await?;
        let summary = RunSummary::from_records(name, Uuid::new_v4(), &records);
        self.summaries.save(&summary).await?;
        reporter.report(RunEvent::ScraperCompleted {
            scraper: name,
            summary: &summary,
        });

        Ok(self.outcome(
            name,
            directive,
            RunState::Completed,
            Some(summary),
            failed_resources,
            None,
        ))
    }

    fn outcome(
        &self,
        name: &str,
        directive: RunDirective,
        state: RunState,
        summary: Option<RunSummary>,
        failed_resources: Vec<FailedResource>,
        error: Option<String>,
    ) -> ScraperRunOutcome {
        ScraperRunOutcome {
            scraper_name: name.to_string(),
            directive,
            state,
            summary,
            failed_resources,
            error,
        }
    }
}

fn absorb_result<R: RunReporter>(
    joined: Result<ResourceResult, JoinError>,
    scraper: &str,
    reporter: &R,
    failed_resources: &mut Vec<FailedResource>,
) {
    let result = match joined {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(%scraper, error = %e, "Resource task panicked");
            return;
        }
    };

    for (stage, detail) in &result.outcomes {
        match detail {
            None => reporter.report(RunEvent::StageCompleted {
                scraper,
                url: &result.url,
                stage: *stage,
            }),
            Some(detail) => {
                reporter.report(RunEvent::StageFailed {
                    scraper,
                    url: &result.url,
                    stage: *stage,
                    error: detail,
                });
                failed_resources.push(FailedResource {
                    url: result.url.clone(),
                    stage: *stage,
                    detail: detail.clone(),
                });
            }
        }
    }
}

/// Execute the requested stages for one resource, persisting every stage
/// outcome as it lands. A failure here is scoped to this resource.
async fn process_resource<F, O, S>(
    runner: StageRunner<F, O>,
    state: S,
    scraper: String,
    url: String,
    work: WorkPlan,
    key: String,
) -> ResourceResult
where
    F: Fetcher,
    O: ObjectStore,
    S: StateStore,
{
    let mut outcomes: Vec<(Stage, Option<String>)> = Vec::new();

    let bytes = match work {
        WorkPlan::RetrieveThenUpload => match runner.retrieve(&url).await {
            Ok(bytes) => {
                if let Err(e) = state
                    .upsert(&scraper, &url, Stage::Retrieve, StageOutcome::success())
                    .await
                {
                    tracing::error!(%scraper, %url, error = %e, "Aborting resource: retrieve outcome not persisted");
                    outcomes.push((Stage::Retrieve, Some(e.to_string())));
                    return ResourceResult { url, outcomes };
                }
                outcomes.push((Stage::Retrieve, None));
                Some(bytes)
            }
            Err(e) => {
                let detail = e.to_string();
                if let Err(persist_err) = state
                    .upsert(&scraper, &url, Stage::Retrieve, StageOutcome::failed(&detail))
                    .await
                {
                    tracing::error!(%scraper, %url, error = %persist_err, "Failed to record retrieve failure");
                }
                outcomes.push((Stage::Retrieve, Some(detail)));
                None
            }
        },

        // Upload-only work streams the source content again without
        // touching the already-successful RETRIEVE record; a fetch failure
        // here means the content is unavailable for upload.
        WorkPlan::UploadOnly => match runner.retrieve(&url).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                let detail = format!("content unavailable for upload: {e}");
                if let Err(persist_err) = state
                    .upsert(&scraper, &url, Stage::Upload, StageOutcome::failed(&detail))
                    .await
                {
                    tracing::error!(%scraper, %url, error = %persist_err, "Failed to record upload failure");
                }
                outcomes.push((Stage::Upload, Some(detail)));
                None
            }
        },
    };

    if let Some(bytes) = bytes {
        match runner.upload(&key, &bytes).await {
            Ok(()) => match state
                .upsert(&scraper, &url, Stage::Upload, StageOutcome::success())
                .await
            {
                Ok(()) => outcomes.push((Stage::Upload, None)),
                Err(e) => {
                    tracing::error!(%scraper, %url, error = %e, "Aborting resource: upload outcome not persisted");
                    outcomes.push((Stage::Upload, Some(e.to_string())));
                }
            },
            Err(e) => {
                let detail = e.to_string();
                if let Err(persist_err) = state
                    .upsert(&scraper, &url, Stage::Upload, StageOutcome::failed(&detail))
                    .await
                {
                    tracing::error!(%scraper, %url, error = %persist_err, "Failed to record upload failure");
                }
                outcomes.push((Stage::Upload, Some(detail)));
            }
        }
    }

    ResourceResult { url, outcomes }
}
