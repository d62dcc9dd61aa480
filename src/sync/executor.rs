// src/sync/executor.rs
// Job executor (§4.5): drives an already-claimed job through up to
// `max_batches_per_job` fetch cycles with inter-batch/inter-job pacing,
// and the outer `run()` loop with cooperative stop. Grounded in the
// teacher's `worker::poll_loop` sleep-and-retry shape, generalized with
// an explicit stop flag instead of a channel since there is exactly one
// cooperative consumer per account.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{info, warn};

use crate::models::SyncJob;
use crate::sync::jobs::SyncJobsService;
use crate::sync::scheduler::Scheduler;
use crate::sync::worker::SyncWorker;

#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    pub max_batches_per_job: u32,
    pub inter_batch_delay_ms: u64,
    pub inter_job_delay_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { max_batches_per_job: 0, inter_batch_delay_ms: 250, inter_job_delay_ms: 1000 }
    }
}

#[derive(Debug, Clone, Default)]
pub struct JobExecutionOutcome {
    pub success: bool,
    pub batches_run: u32,
    pub has_more_work: bool,
    pub error: Option<String>,
}

pub struct JobExecutor {
    scheduler: Scheduler,
    jobs: SyncJobsService,
    worker: SyncWorker,
    config: ExecutorConfig,
    stop: Arc<AtomicBool>,
    last_completion_epoch_ms: std::sync::Mutex<Option<i64>>,
}

impl JobExecutor {
    pub fn new(scheduler: Scheduler, jobs: SyncJobsService, worker: SyncWorker, config: ExecutorConfig) -> Self {
        Self { scheduler, jobs, worker, config, stop: Arc::new(AtomicBool::new(false)), last_completion_epoch_ms: std::sync::Mutex::new(None) }
    }

    /// Cooperative cancellation: checked between batches and before the
    /// no-jobs sleep. Does not interrupt an in-flight remote call.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Loops fetch-and-apply cycles for `job` up to `max_batches_per_job`
    /// (0 = unlimited), updating progress after each successful batch and
    /// pacing `inter_batch_delay_ms` between them. Finalizes the job to
    /// Completed when the handler reports no more work, or leaves it
    /// Running with `has_more_work=true` if the batch cap was hit first.
    pub async fn execute_job(&self, job: &SyncJob) -> Result<JobExecutionOutcome> {
        let mut batches_run = 0u32;
        let mut current = job.clone();

        loop {
            if self.should_stop() {
                return Ok(JobExecutionOutcome { success: true, batches_run, has_more_work: true, error: None });
            }

            let result = match self.worker.run_one_batch(&current, &self.jobs).await {
                Ok(r) => r,
                Err(e) => {
                    self.jobs.mark_failed(job.id, &e.to_string()).await?;
                    return Ok(JobExecutionOutcome { success: false, batches_run, has_more_work: false, error: Some(e.to_string()) });
                }
            };
            batches_run += 1;

            if result.rate_limited {
                let msg = format!("Rate limited: wait {}s", result.wait_seconds);
                self.jobs.mark_failed(job.id, &msg).await?;
                return Ok(JobExecutionOutcome { success: false, batches_run, has_more_work: false, error: Some(msg) });
            }
            if !result.success {
                let msg = result.error.unwrap_or_else(|| "unknown failure".to_string());
                self.jobs.mark_failed(job.id, &msg).await?;
                return Ok(JobExecutionOutcome { success: false, batches_run, has_more_work: false, error: Some(msg) });
            }

            self.jobs.update_progress(job.id, None, result.new_cursor, result.messages_fetched).await?;

            let batch_cap_hit = self.config.max_batches_per_job > 0 && batches_run >= self.config.max_batches_per_job;
            if !result.has_more || batch_cap_hit {
                if !batch_cap_hit {
                    self.jobs.mark_completed(job.id).await?;
                }
                return Ok(JobExecutionOutcome { success: true, batches_run, has_more_work: batch_cap_hit, error: None });
            }

            current.cursor_end = result.new_cursor;
            tokio::time::sleep(Duration::from_millis(self.config.inter_batch_delay_ms)).await;
        }
    }

    /// Claims the next job (if any), enforces `inter_job_delay_ms`
    /// relative to the last completion, and runs it to completion/cap.
    pub async fn process_next_job(&self) -> Result<Option<JobExecutionOutcome>> {
        let Some(job) = self.scheduler.get_next_job().await? else {
            return Ok(None);
        };

        if let Some(last) = *self.last_completion_epoch_ms.lock().unwrap() {
            let elapsed = now_ms() - last;
            let remaining = self.config.inter_job_delay_ms as i64 - elapsed;
            if remaining > 0 {
                tokio::time::sleep(Duration::from_millis(remaining as u64)).await;
            }
        }

        let outcome = self.execute_job(&job).await?;
        *self.last_completion_epoch_ms.lock().unwrap() = Some(now_ms());
        Ok(Some(outcome))
    }

    /// Looped `process_next_job`; sleeps 1s when the queue is empty.
    /// Exits once `request_stop()` has been called.
    pub async fn run(&self) {
        info!("job executor loop starting");
        while !self.should_stop() {
            match self.process_next_job().await {
                Ok(Some(outcome)) if !outcome.success => {
                    warn!(error = ?outcome.error, "job failed");
                }
                Ok(Some(_)) => {}
                Ok(None) => {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => {
                    warn!(error = %e, "executor iteration error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
        info!("job executor loop stopped");
    }
}

fn now_ms() -> i64 {
    crate::store::now() * 1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MessageCache;
    use crate::models::{JobType, RawMessage};
    use crate::remote::{GetMessagesParams, GetMessagesResult, RemoteClient, RemoteError};
    use crate::store::Store;
    use crate::sync::rate_limits::RateLimitsService;
    use crate::sync::state::ChatSyncStateService;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedRemote {
        batches: Mutex<Vec<GetMessagesResult>>,
    }

    #[async_trait]
    impl RemoteClient for ScriptedRemote {
        async fn get_messages(&self, _chat_id: &str, _params: GetMessagesParams) -> Result<GetMessagesResult, RemoteError> {
            let mut batches = self.batches.lock().unwrap();
            if batches.is_empty() {
                return Ok(GetMessagesResult { messages: Vec::new(), no_more_messages: true });
            }
            Ok(batches.remove(0))
        }
    }

    fn raw(id: i64) -> RawMessage {
        RawMessage {
            id,
            chat_id: "100".to_string(),
            sender_id: None,
            text: Some("hi".to_string()),
            message_type: None,
            has_media: false,
            reply_to_id: None,
            forward_from_id: None,
            is_outgoing: false,
            date: 1000,
            raw_payload: serde_json::json!({}),
        }
    }

    fn build(store: &Store, remote: Arc<dyn RemoteClient>, config: ExecutorConfig) -> JobExecutor {
        let jobs = SyncJobsService::new(store.cache.clone());
        let state = ChatSyncStateService::new(store.cache.clone());
        let messages = MessageCache::new(store.cache.clone());
        let scheduler = Scheduler::new(
            SyncJobsService::new(store.cache.clone()),
            ChatSyncStateService::new(store.cache.clone()),
            MessageCache::new(store.cache.clone()),
        );
        let rate_limits = RateLimitsService::new(store.cache.clone());
        let worker = SyncWorker::new(remote, rate_limits, state, messages).with_batch_size(5);
        JobExecutor::new(scheduler, jobs, worker, config)
    }

    #[tokio::test]
    async fn execute_job_completes_when_batch_is_short() {
        let store = Store::open_in_memory().await.unwrap();
        let remote = Arc::new(ScriptedRemote {
            batches: Mutex::new(vec![GetMessagesResult { messages: vec![raw(1), raw(2)], no_more_messages: true }]),
        });
        let executor = build(&store, remote, ExecutorConfig::default());
        let jobs = SyncJobsService::new(store.cache.clone());
        let job = jobs.create("100", JobType::ForwardCatchup, 0).await.unwrap();
        jobs.mark_running(job.id).await.unwrap();
        let job = jobs.get(job.id).await.unwrap().unwrap();

        let outcome = executor.execute_job(&job).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.batches_run, 1);
        assert!(!outcome.has_more_work);

        let after = jobs.get(job.id).await.unwrap().unwrap();
        assert_eq!(after.status, crate::models::JobStatus::Completed);
    }

    #[tokio::test]
    async fn batch_cap_leaves_job_running_with_more_work() {
        let store = Store::open_in_memory().await.unwrap();
        let remote = Arc::new(ScriptedRemote {
            batches: Mutex::new(vec![
                GetMessagesResult { messages: (1..=5).map(raw).collect(), no_more_messages: false },
                GetMessagesResult { messages: (6..=10).map(raw).collect(), no_more_messages: false },
            ]),
        });
        let executor = build(&store, remote, ExecutorConfig { max_batches_per_job: 1, inter_batch_delay_ms: 0, inter_job_delay_ms: 0 });
        let jobs = SyncJobsService::new(store.cache.clone());
        let job = jobs.create("100", JobType::ForwardCatchup, 0).await.unwrap();
        jobs.mark_running(job.id).await.unwrap();
        let job = jobs.get(job.id).await.unwrap().unwrap();

        let outcome = executor.execute_job(&job).await.unwrap();
        assert_eq!(outcome.batches_run, 1);
        assert!(outcome.has_more_work);

        let after = jobs.get(job.id).await.unwrap().unwrap();
        assert_eq!(after.status, crate::models::JobStatus::Running);
    }

    #[tokio::test]
    async fn request_stop_halts_the_batch_loop() {
        let store = Store::open_in_memory().await.unwrap();
        let remote = Arc::new(ScriptedRemote {
            batches: Mutex::new(vec![GetMessagesResult { messages: (1..=5).map(raw).collect(), no_more_messages: false }]),
        });
        let executor = build(&store, remote, ExecutorConfig { max_batches_per_job: 0, inter_batch_delay_ms: 0, inter_job_delay_ms: 0 });
        let jobs = SyncJobsService::new(store.cache.clone());
        let job = jobs.create("100", JobType::ForwardCatchup, 0).await.unwrap();
        jobs.mark_running(job.id).await.unwrap();
        let job = jobs.get(job.id).await.unwrap().unwrap();

        executor.request_stop();
        let outcome = executor.execute_job(&job).await.unwrap();
        assert_eq!(outcome.batches_run, 0);
        assert!(outcome.has_more_work);
    }
}
