// src/sync/mod.rs
// The background sync subsystem (§2 L1/L2/L3): jobs, per-chat state,
// rate limits, scheduler, worker, executor, and live update handlers.

pub mod executor;
pub mod jobs;
pub mod rate_limits;
pub mod scheduler;
pub mod state;
pub mod updates;
pub mod worker;

pub use executor::{ExecutorConfig, JobExecutionOutcome, JobExecutor};
pub use jobs::{JobStatusCounts, PendingCount, SyncJobsService};
pub use rate_limits::RateLimitsService;
pub use scheduler::{Scheduler, StartupSummary};
pub use state::{ChatSyncStateService, SyncDirection};
pub use updates::{UpdateEvent, UpdateHandlers};
pub use worker::{SyncWorker, WorkResult};
