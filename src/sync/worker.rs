// src/sync/worker.rs
// Sync worker (§4.4): job-type dispatch over an abstract remote client,
// with rate-limit preflight, cursor discipline, and flood-wait
// translation. Grounded in the teacher's `ingest::pipeline` dispatch-by-kind
// pattern, generalized to three job types instead of one content kind.

use std::sync::Arc;

use anyhow::Result;

use crate::cache::MessageCache;
use crate::models::{JobType, Message, SyncJob};
use crate::remote::{GetMessagesParams, RemoteClient, RemoteError};
use crate::sync::rate_limits::RateLimitsService;
use crate::sync::state::{ChatSyncStateService, SyncDirection};
use crate::store::now;

/// Outcome of one job-type handler invocation.
#[derive(Debug, Clone, Default)]
pub struct WorkResult {
    pub success: bool,
    pub messages_fetched: i64,
    pub has_more: bool,
    pub new_cursor: Option<i64>,
    pub rate_limited: bool,
    pub wait_seconds: i64,
    pub error: Option<String>,
}

pub struct SyncWorker {
    remote: Arc<dyn RemoteClient>,
    rate_limits: RateLimitsService,
    state: ChatSyncStateService,
    messages: MessageCache,
    batch_size: i64,
    api_method: String,
}

impl SyncWorker {
    pub fn new(
        remote: Arc<dyn RemoteClient>,
        rate_limits: RateLimitsService,
        state: ChatSyncStateService,
        messages: MessageCache,
    ) -> Self {
        Self { remote, rate_limits, state, messages, batch_size: 100, api_method: "messages.getHistory".to_string() }
    }

    pub fn with_batch_size(mut self, batch_size: i64) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_api_method(mut self, api_method: impl Into<String>) -> Self {
        self.api_method = api_method.into();
        self
    }

    /// True iff the worker's configured method is not currently blocked.
    pub async fn can_make_api_call(&self) -> Result<bool> {
        Ok(!self.rate_limits.is_blocked(&self.api_method).await?)
    }

    /// Dispatches one job by type: markRunning (fails if not Pending),
    /// runs one batch, then finalizes per §4.4's contract. This is the
    /// worker's own single-shot entry point; the executor's multi-batch
    /// loop (§4.5) instead drives `run_one_batch` directly against an
    /// already-Running job.
    pub async fn process_job(&self, scheduler_jobs: &crate::sync::jobs::SyncJobsService, job: &SyncJob) -> Result<WorkResult> {
        if !scheduler_jobs.mark_running(job.id).await? {
            return Ok(WorkResult { success: false, error: Some("job was not Pending".to_string()), ..Default::default() });
        }

        let result = self.run_one_batch(job, scheduler_jobs).await;

        let result = match result {
            Ok(r) => r,
            Err(e) => WorkResult { success: false, error: Some(e.to_string()), ..Default::default() },
        };

        if result.success {
            scheduler_jobs.mark_completed(job.id).await?;
        } else if result.rate_limited {
            scheduler_jobs
                .mark_failed(job.id, &format!("Rate limited: wait {}s", result.wait_seconds))
                .await?;
        } else {
            let msg = result.error.clone().unwrap_or_else(|| "unknown failure".to_string());
            scheduler_jobs.mark_failed(job.id, &msg).await?;
        }

        Ok(result)
    }

    /// One iteration: if the rate limit is already tripped, returns a
    /// rate-limited result without consuming a job from the queue
    /// (preserves priority order for when the block clears). Returns
    /// `Ok(None)` iff no Pending job exists.
    pub async fn run_once(
        &self,
        jobs: &crate::sync::jobs::SyncJobsService,
    ) -> Result<Option<WorkResult>> {
        if !self.can_make_api_call().await? {
            let wait = self.rate_limits.get_wait_time(&self.api_method).await?;
            return Ok(Some(WorkResult { rate_limited: true, wait_seconds: wait, ..Default::default() }));
        }

        let Some(job) = jobs.claim_next_job().await? else {
            return Ok(None);
        };
        Ok(Some(self.process_job(jobs, &job).await?))
    }

    /// Runs exactly one fetch-and-apply cycle for the job's type, without
    /// touching its status - the caller owns markRunning/markCompleted/
    /// markFailed around this.
    pub async fn run_one_batch(&self, job: &SyncJob, jobs: &crate::sync::jobs::SyncJobsService) -> Result<WorkResult> {
        match job.job_type {
            JobType::ForwardCatchup => self.forward_catchup(&job.chat_id).await,
            JobType::BackwardHistory => self.backward_history(&job.chat_id).await,
            JobType::InitialLoad => self.initial_load(&job.chat_id, job.id, jobs).await,
        }
    }

    async fn preflight_and_fetch(
        &self,
        chat_id: &str,
        params: GetMessagesParams,
    ) -> Result<Result<crate::remote::GetMessagesResult, WorkResult>> {
        if self.rate_limits.is_blocked(&self.api_method).await? {
            let wait = self.rate_limits.get_wait_time(&self.api_method).await?;
            return Ok(Err(WorkResult { rate_limited: true, wait_seconds: wait, ..Default::default() }));
        }

        self.rate_limits.record_call(&self.api_method).await?;

        match self.remote.get_messages(chat_id, params).await {
            Ok(result) => Ok(Ok(result)),
            Err(RemoteError::FloodWait(fw)) => {
                self.rate_limits.set_flood_wait(&self.api_method, fw.seconds).await?;
                Ok(Err(WorkResult { rate_limited: true, wait_seconds: fw.seconds, ..Default::default() }))
            }
            Err(e) => Ok(Err(WorkResult { success: false, error: Some(e.to_string()), ..Default::default() })),
        }
    }

    /// "messages newer than the forward cursor, up to batchSize."
    async fn forward_catchup(&self, chat_id: &str) -> Result<WorkResult> {
        let state = self.state.get_or_create(chat_id, "private").await?;
        let cursor = state.forward_cursor.unwrap_or(0);

        let params = GetMessagesParams {
            limit: self.batch_size,
            offset_id: Some(cursor),
            add_offset: Some(-self.batch_size),
            min_id: None,
        };
        let fetched = match self.preflight_and_fetch(chat_id, params).await? {
            Ok(r) => r,
            Err(rate_limited) => return Ok(rate_limited),
        };

        let rows: Vec<Message> = fetched.messages.iter().cloned().map(|m| m.into_message(now())).collect();
        self.messages.upsert_batch(&rows).await?;

        let max_id = rows.iter().map(|m| m.message_id).max();
        if let Some(max_id) = max_id {
            self.state.update_cursors(chat_id, Some(max_id), None).await?;
        }
        self.state.increment_synced_messages(chat_id, rows.len() as i64).await?;
        self.state.update_last_sync(chat_id, SyncDirection::Forward).await?;

        Ok(WorkResult {
            success: true,
            messages_fetched: rows.len() as i64,
            has_more: rows.len() as i64 == self.batch_size,
            new_cursor: max_id,
            ..Default::default()
        })
    }

    async fn backward_history(&self, chat_id: &str) -> Result<WorkResult> {
        let state = self.state.get_or_create(chat_id, "private").await?;
        if state.history_complete {
            return Ok(WorkResult { success: true, ..Default::default() });
        }

        let offset_id = match state.backward_cursor {
            Some(c) => Some(c),
            None => self.messages.get_oldest_message_id(chat_id).await?,
        };

        let params = GetMessagesParams { limit: self.batch_size, offset_id, add_offset: None, min_id: None };
        let fetched = match self.preflight_and_fetch(chat_id, params).await? {
            Ok(r) => r,
            Err(rate_limited) => return Ok(rate_limited),
        };

        let rows: Vec<Message> = fetched.messages.iter().cloned().map(|m| m.into_message(now())).collect();
        self.messages.upsert_batch(&rows).await?;

        let min_id = rows.iter().map(|m| m.message_id).min();
        if let Some(min_id) = min_id {
            self.state.update_cursors(chat_id, None, Some(min_id)).await?;
        }

        let short_batch = (rows.len() as i64) < self.batch_size;
        if rows.is_empty() || fetched.no_more_messages || short_batch {
            self.state.mark_history_complete(chat_id).await?;
        }
        self.state.update_last_sync(chat_id, SyncDirection::Backward).await?;

        Ok(WorkResult {
            success: true,
            messages_fetched: rows.len() as i64,
            has_more: !short_batch && !fetched.no_more_messages,
            new_cursor: min_id,
            ..Default::default()
        })
    }

    /// Fetches the most recent window with no offset, then sets both
    /// cursors from that single batch in one go.
    async fn initial_load(
        &self,
        chat_id: &str,
        job_id: i64,
        jobs: &crate::sync::jobs::SyncJobsService,
    ) -> Result<WorkResult> {
        self.state.get_or_create(chat_id, "private").await?;

        let params = GetMessagesParams { limit: self.batch_size, offset_id: None, add_offset: None, min_id: None };
        let fetched = match self.preflight_and_fetch(chat_id, params).await? {
            Ok(r) => r,
            Err(rate_limited) => return Ok(rate_limited),
        };

        let rows: Vec<Message> = fetched.messages.iter().cloned().map(|m| m.into_message(now())).collect();
        self.messages.upsert_batch(&rows).await?;

        let max_id = rows.iter().map(|m| m.message_id).max();
        let min_id = rows.iter().map(|m| m.message_id).min();
        self.state.update_cursors(chat_id, max_id, min_id).await?;
        self.state.increment_synced_messages(chat_id, rows.len() as i64).await?;

        let short_batch = (rows.len() as i64) < self.batch_size;
        if rows.is_empty() || short_batch {
            self.state.mark_history_complete(chat_id).await?;
        }

        jobs.update_progress(job_id, max_id, min_id, rows.len() as i64).await?;

        Ok(WorkResult {
            success: true,
            messages_fetched: rows.len() as i64,
            has_more: !short_batch,
            new_cursor: max_id,
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawMessage;
    use crate::remote::GetMessagesResult;
    use crate::store::Store;
    use crate::sync::jobs::SyncJobsService;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct ScriptedRemote {
        batches: Mutex<Vec<GetMessagesResult>>,
    }

    #[async_trait]
    impl RemoteClient for ScriptedRemote {
        async fn get_messages(
            &self,
            _chat_id: &str,
            _params: GetMessagesParams,
        ) -> Result<GetMessagesResult, RemoteError> {
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

    #[tokio::test]
    async fn initial_load_on_short_batch_marks_history_complete() {
        let store = Store::open_in_memory().await.unwrap();
        let remote = Arc::new(ScriptedRemote {
            batches: Mutex::new(vec![GetMessagesResult {
                messages: (91..=100).rev().map(raw).collect(),
                no_more_messages: true,
            }]),
        });
        let worker = SyncWorker::new(
            remote,
            RateLimitsService::new(store.cache.clone()),
            ChatSyncStateService::new(store.cache.clone()),
            MessageCache::new(store.cache.clone()),
        )
        .with_batch_size(200);

        let jobs = SyncJobsService::new(store.cache.clone());
        let job = jobs.create("100", JobType::InitialLoad, 2).await.unwrap();
        let result = worker.process_job(&jobs, &job).await.unwrap();

        assert!(result.success);
        assert_eq!(result.messages_fetched, 10);

        let state = ChatSyncStateService::new(store.cache.clone()).get("100").await.unwrap().unwrap();
        assert_eq!(state.forward_cursor, Some(100));
        assert_eq!(state.backward_cursor, Some(91));
        assert!(state.history_complete);
        assert_eq!(state.synced_messages, 10);

        let job_after = jobs.get(job.id).await.unwrap().unwrap();
        assert_eq!(job_after.cursor_start, Some(100));
        assert_eq!(job_after.cursor_end, Some(91));
    }

    #[tokio::test]
    async fn forward_catchup_advances_cursor_to_batch_max() {
        let store = Store::open_in_memory().await.unwrap();
        let remote = Arc::new(ScriptedRemote {
            batches: Mutex::new(vec![GetMessagesResult {
                messages: vec![raw(52), raw(51)],
                no_more_messages: false,
            }]),
        });
        let state_svc = ChatSyncStateService::new(store.cache.clone());
        let mut s = crate::models::ChatSyncState::new("100", "private", now());
        s.forward_cursor = Some(50);
        state_svc.upsert(&s).await.unwrap();

        let worker = SyncWorker::new(
            remote,
            RateLimitsService::new(store.cache.clone()),
            state_svc,
            MessageCache::new(store.cache.clone()),
        )
        .with_batch_size(100);

        let jobs = SyncJobsService::new(store.cache.clone());
        let job = jobs.create("100", JobType::ForwardCatchup, 0).await.unwrap();
        let result = worker.process_job(&jobs, &job).await.unwrap();

        assert!(result.success);
        assert_eq!(result.messages_fetched, 2);
        let state = ChatSyncStateService::new(store.cache.clone()).get("100").await.unwrap().unwrap();
        assert_eq!(state.forward_cursor, Some(52));
    }

    #[tokio::test]
    async fn blocked_rate_limit_prevents_the_remote_call_entirely() {
        let store = Store::open_in_memory().await.unwrap();
        let remote = Arc::new(ScriptedRemote { batches: Mutex::new(vec![]) });
        let rate_limits = RateLimitsService::new(store.cache.clone());
        rate_limits.set_flood_wait("messages.getHistory", 30).await.unwrap();

        let worker = SyncWorker::new(
            remote,
            rate_limits,
            ChatSyncStateService::new(store.cache.clone()),
            MessageCache::new(store.cache.clone()),
        );

        let jobs = SyncJobsService::new(store.cache.clone());
        let job = jobs.create("100", JobType::ForwardCatchup, 0).await.unwrap();
        let result = worker.process_job(&jobs, &job).await.unwrap();

        assert!(!result.success);
        assert!(result.rate_limited);
        let failed = jobs.get(job.id).await.unwrap().unwrap();
        assert!(failed.error_message.unwrap().starts_with("Rate limited"));
    }
}
