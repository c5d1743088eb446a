pub mod analytics;
pub mod config;
pub mod directive;
pub mod error;
pub mod orchestrator;
pub mod policy;
pub mod resource;
pub mod stage;
pub mod state;
pub mod testutil;
pub mod throttle;
pub mod traits;

pub use analytics::RunSummary;
pub use config::{load_scraper_configs, ScraperConfig};
pub use directive::{RunDirective, RunState};
pub use error::AppError;
pub use orchestrator::{
    OrchestratorConfig, RunEvent, RunOrchestrator, RunReporter, ScraperRunOutcome,
    TracingRunReporter,
};
pub use resource::{ResourceRecord, Stage, StageOutcome, StageStatus};
pub use stage::{storage_key, StageRunner};
pub use state::{StageStatusFilter, StateStore, SummaryStore};
pub use traits::{Fetcher, ObjectStore, ScraperPlugin};
