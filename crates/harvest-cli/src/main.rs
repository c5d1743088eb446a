use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use harvest_client::{ReqwestFetcher, S3ObjectStore, SitePlugin, StorageConfig};
use harvest_core::config::{load_scraper_configs, ScraperConfig};
use harvest_core::directive::RunDirective;
use harvest_core::orchestrator::{
    OrchestratorConfig, RunOrchestrator, ScraperRunOutcome, TracingRunReporter,
};
use harvest_core::stage::StageRunner;
use harvest_core::state::SummaryStore;
use harvest_core::throttle::{ThrottleConfig, ThrottledFetcher};
use harvest_db::{Database, DatabaseConfig};

#[derive(Parser)]
#[command(name = "harvest", version, about = "Resumable scrape/retrieve/upload pipeline")]
struct Cli {
    /// Scrapers to run, comma-separated (defaults to every configured scraper)
    #[arg(short, long, value_delimiter = ',')]
    scrapers: Vec<String>,

    /// Re-run scrapers from scratch even if a completed run exists
    #[arg(long, default_value_t = false)]
    force: bool,

    /// Re-process only resources whose retrieve or upload is incomplete
    #[arg(long, default_value_t = false)]
    resume: bool,

    /// Re-process only resources retrieved successfully but not uploaded
    #[arg(long, default_value_t = false)]
    resume_upload: bool,

    /// Print the latest run summary per scraper without running any stage
    #[arg(long, default_value_t = false)]
    analytics_only: bool,

    /// Concurrent per-resource workers
    #[arg(short, long, env = "HARVEST_WORKERS", default_value_t = 4)]
    workers: usize,

    /// Path to the scraper configuration JSON file
    #[arg(short, long, env = "HARVEST_CONFIG", default_value = "scrapers.json")]
    config: PathBuf,

    /// Allow fetching from private/reserved IPs (e.g. a local mirror)
    #[arg(long, default_value_t = false)]
    allow_private: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("harvest=info".parse()?))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let directive = RunDirective::resolve(
        cli.force,
        cli.resume,
        cli.resume_upload,
        cli.analytics_only,
    )
    .map_err(|e| anyhow::anyhow!(e))?;

    let configs = load_scraper_configs(&cli.config).map_err(|e| anyhow::anyhow!(e))?;

    // Unknown scraper names are a usage error, caught before any work.
    let selected: Vec<(String, ScraperConfig)> = if cli.scrapers.is_empty() {
        configs.into_iter().collect()
    } else {
        let mut selected = Vec::with_capacity(cli.scrapers.len());
        for name in &cli.scrapers {
            let config = configs
                .get(name)
                .with_context(|| format!("Unknown scraper '{name}' (not in {})", cli.config.display()))?;
            selected.push((name.clone(), config.clone()));
        }
        selected
    };

    if selected.is_empty() {
        bail!("No scrapers configured in {}", cli.config.display());
    }

    let db = Database::connect(&DatabaseConfig::from_env().map_err(|e| anyhow::anyhow!(e))?)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;
    db.migrate().await.map_err(|e| anyhow::anyhow!(e))?;

    // Analytics is a pure summary read; no fetcher, object store, or
    // orchestrator is assembled for it.
    if directive == RunDirective::AnalyticsOnly {
        return report_analytics(&db, &selected).await;
    }

    let fetcher = {
        let http = ReqwestFetcher::new().map_err(|e| anyhow::anyhow!(e))?;
        let http = if cli.allow_private {
            http.allow_private_urls()
        } else {
            http
        };
        ThrottledFetcher::new(http, ThrottleConfig::default())
    };

    let store = S3ObjectStore::new(StorageConfig::from_env().map_err(|e| anyhow::anyhow!(e))?);

    let orchestrator = RunOrchestrator::new(
        StageRunner::new(fetcher.clone(), store),
        db.resource_repo(),
        db.summary_repo(),
        OrchestratorConfig {
            workers: cli.workers.max(1),
        },
    );

    let plugins: Vec<_> = selected
        .into_iter()
        .map(|(name, config)| {
            let plugin = SitePlugin::new(name, config.clone(), fetcher.clone());
            (plugin, config)
        })
        .collect();

    let cancel = CancellationToken::new();
    let signal_guard = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received, finishing in-flight work");
            signal_guard.cancel();
        }
    });

    let outcomes = orchestrator
        .run_many(&plugins, directive, &cancel, &TracingRunReporter)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    report(&outcomes)
}

/// `--analytics-only` report: the latest persisted summary per selected
/// scraper, printed to stdout. Read-only; a scraper without a prior run
/// is an error and the exit code is nonzero.
async fn report_analytics(db: &Database, selected: &[(String, ScraperConfig)]) -> Result<()> {
    let summaries = db.summary_repo();
    let mut missing = Vec::new();
    for (name, _) in selected {
        match summaries.latest(name).await.map_err(|e| anyhow::anyhow!(e))? {
            Some(summary) => println!("{}", serde_json::to_string_pretty(&summary)?),
            None => {
                tracing::error!(scraper = %name, "No prior run summary for scraper");
                missing.push(name.as_str());
            }
        }
    }

    if !missing.is_empty() {
        bail!("No prior run for: {}", missing.join(", "));
    }
    Ok(())
}

/// Final run report: failures to the log, and a nonzero exit when any
/// scraper did not reach a completed run. Per-resource failures are
/// surfaced but never change the exit code.
fn report(outcomes: &[ScraperRunOutcome]) -> Result<()> {
    for outcome in outcomes {
        for failed in &outcome.failed_resources {
            tracing::warn!(
                scraper = %outcome.scraper_name,
                url = %failed.url,
                stage = %failed.stage,
                detail = %failed.detail,
                "Resource incomplete, eligible for --resume"
            );
        }
    }

    let incomplete: Vec<&str> = outcomes
        .iter()
        .filter(|o| !o.completed())
        .map(|o| o.scraper_name.as_str())
        .collect();

    if !incomplete.is_empty() {
        bail!("{} scraper(s) did not complete: {}", incomplete.len(), incomplete.join(", "));
    }
    Ok(())
}
