// src/bin/telegram-sync-daemon.rs
// Daemon entrypoint (§4.8): single-instance check, no-accounts exit,
// startup sequencing (schema + per-account scheduler init + workers +
// executor), graceful shutdown on SIGTERM/SIGINT.

use std::sync::Arc;

use anyhow::Result;
use tracing::{error, info};

use telegram_sync_core::accounts::AccountsService;
use telegram_sync_core::config::RuntimeConfig;
use telegram_sync_core::daemon::{check_single_instance, remove_pid_file, write_pid_file, DaemonRuntime};
use telegram_sync_core::remote::NullRemoteClient;
use telegram_sync_core::store::Store;
use telegram_sync_core::sync::{ChatSyncStateService, ExecutorConfig, JobExecutor, Scheduler, SyncJobsService, SyncWorker};
use telegram_sync_core::cache::MessageCache;

#[tokio::main]
async fn main() {
    let filter = if std::env::var("VERBOSE").map(|v| v == "1").unwrap_or(false) { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(filter).unwrap())
        .init();

    if let Err(e) = run().await {
        error!(error = %e, "daemon exited with error");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = RuntimeConfig::load()?;
    let pid_file = config.pid_file_path();

    check_single_instance(&pid_file)?;

    let store = Store::open(&config.data_dir).await?;

    let accounts = AccountsService::new(store.accounts.clone());
    if accounts.count().await? == 0 {
        anyhow::bail!("no accounts configured; run `telegram-sync-cli auth login` first");
    }

    write_pid_file(&pid_file)?;
    info!(data_dir = %config.data_dir.display(), "daemon starting");

    let jobs = SyncJobsService::new(store.cache.clone());
    let state = ChatSyncStateService::new(store.cache.clone());
    let messages = MessageCache::new(store.cache.clone());
    let scheduler = Scheduler::new(
        SyncJobsService::new(store.cache.clone()),
        ChatSyncStateService::new(store.cache.clone()),
        MessageCache::new(store.cache.clone()),
    );

    let summary = scheduler.initialize_for_startup().await?;
    info!(?summary, "startup sync initialization complete");

    // No remote transport is wired into this core build; the executor
    // runs against a null client so the pipeline itself still exercises
    // the full job lifecycle end to end.
    let worker = SyncWorker::new(
        Arc::new(NullRemoteClient),
        telegram_sync_core::sync::RateLimitsService::new(store.cache.clone()),
        state,
        messages,
    );

    let executor = Arc::new(JobExecutor::new(scheduler, jobs, worker, ExecutorConfig::default()));

    let runtime = DaemonRuntime {
        data_dir: config.data_dir.clone(),
        store,
        executor,
        shutdown_timeout: std::time::Duration::from_millis(5000),
    };

    runtime.run().await?;

    remove_pid_file(&pid_file);
    info!("daemon stopped cleanly");
    Ok(())
}
