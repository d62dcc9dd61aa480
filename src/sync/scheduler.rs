// src/sync/scheduler.rs
// Orchestration layer (§4.3): translates chat-level sync intent into
// idempotently-queued jobs, and runs the four-step startup sequence that
// reconciles crash recovery with enabled-chat enqueue. Grounded in the
// teacher's `project/orchestrator.rs` pattern of a thin layer over two
// stores that never touches SQL directly itself.

use anyhow::Result;

use crate::cache::MessageCache;
use crate::models::{JobType, SyncJob, SyncPriority};
use crate::sync::jobs::{JobStatusCounts, SyncJobsService};
use crate::sync::state::ChatSyncStateService;

pub struct Scheduler {
    jobs: SyncJobsService,
    state: ChatSyncStateService,
    messages: MessageCache,
}

impl Scheduler {
    pub fn new(jobs: SyncJobsService, state: ChatSyncStateService, messages: MessageCache) -> Self {
        Self { jobs, state, messages }
    }

    /// No-op if a Pending ForwardCatchup already exists for the chat;
    /// otherwise inserts one at Realtime priority.
    pub async fn queue_forward_catchup(&self, chat_id: &str) -> Result<Option<SyncJob>> {
        if self.jobs.has_active_job_for_chat(chat_id, JobType::ForwardCatchup).await? {
            return Ok(None);
        }
        Ok(Some(self.jobs.create(chat_id, JobType::ForwardCatchup, SyncPriority::Realtime.as_i64()).await?))
    }

    /// No-op if `history_complete`, no-op if a Pending BackwardHistory
    /// already exists. If the chat has no cached messages and no
    /// backward cursor yet, queues an InitialLoad instead - a bare
    /// backward-offset call against an empty chat would never terminate.
    pub async fn queue_backward_history(&self, chat_id: &str) -> Result<Option<SyncJob>> {
        let Some(state) = self.state.get(chat_id).await? else {
            return Ok(None);
        };
        if state.history_complete {
            return Ok(None);
        }
        if self.jobs.has_active_job_for_chat(chat_id, JobType::BackwardHistory).await? {
            return Ok(None);
        }

        if state.backward_cursor.is_none() && self.messages.count_by_chat_id(chat_id).await? == 0 {
            return self.queue_initial_load(chat_id, 10).await;
        }

        Ok(Some(self.jobs.create(chat_id, JobType::BackwardHistory, SyncPriority::Background.as_i64()).await?))
    }

    /// No-op if a Pending InitialLoad already exists; priority taken from
    /// the chat's sync-state (defaulting to Medium).
    pub async fn queue_initial_load(&self, chat_id: &str, _batch_size: i64) -> Result<Option<SyncJob>> {
        if self.jobs.has_active_job_for_chat(chat_id, JobType::InitialLoad).await? {
            return Ok(None);
        }
        let priority = match self.state.get(chat_id).await? {
            Some(s) => s.sync_priority,
            None => SyncPriority::Medium,
        };
        Ok(Some(self.jobs.create(chat_id, JobType::InitialLoad, priority.as_i64()).await?))
    }

    /// The exact four-step order from §4.3: recover crashed jobs first so
    /// step 2's catchup enqueue doesn't race a Running row still being
    /// reverted, then forward catchup for every enabled chat, then
    /// InitialLoad for never-synced chats at priority <= Medium, then
    /// BackwardHistory for incomplete-history chats at the same cutoff.
    pub async fn initialize_for_startup(&self) -> Result<StartupSummary> {
        let recovered = self.jobs.recover_crashed_jobs().await?;

        let enabled = self.state.get_enabled_chats().await?;
        let mut forward_catchup_queued = 0;
        for chat in &enabled {
            if self.queue_forward_catchup(&chat.chat_id).await?.is_some() {
                forward_catchup_queued += 1;
            }
        }

        let mut initial_load_queued = 0;
        for chat in &enabled {
            if chat.sync_priority <= SyncPriority::Medium
                && chat.synced_messages == 0
                && !chat.history_complete
                && self.queue_initial_load(&chat.chat_id, 10).await?.is_some()
            {
                initial_load_queued += 1;
            }
        }

        let mut backward_history_queued = 0;
        for chat in &enabled {
            if !chat.history_complete
                && chat.sync_priority <= SyncPriority::Medium
                && self.queue_backward_history(&chat.chat_id).await?.is_some()
            {
                backward_history_queued += 1;
            }
        }

        Ok(StartupSummary {
            recovered_jobs: recovered,
            forward_catchup_queued,
            initial_load_queued,
            backward_history_queued,
        })
    }

    pub async fn get_next_job(&self) -> Result<Option<SyncJob>> {
        self.jobs.claim_next_job().await
    }

    pub async fn start_job(&self, id: i64) -> Result<bool> {
        self.jobs.mark_running(id).await
    }

    pub async fn complete_job(&self, id: i64) -> Result<bool> {
        self.jobs.mark_completed(id).await
    }

    pub async fn fail_job(&self, id: i64, error_message: &str) -> Result<bool> {
        self.jobs.mark_failed(id, error_message).await
    }

    pub async fn update_progress(&self, id: i64, cursor_start: Option<i64>, cursor_end: Option<i64>, messages_delta: i64) -> Result<()> {
        self.jobs.update_progress(id, cursor_start, cursor_end, messages_delta).await
    }

    pub async fn get_status(&self) -> Result<JobStatusCounts> {
        self.jobs.status_counts().await
    }
}

#[derive(Debug, Clone, Default)]
pub struct StartupSummary {
    pub recovered_jobs: u64,
    pub forward_catchup_queued: i64,
    pub initial_load_queued: i64,
    pub backward_history_queued: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn scheduler(store: &Store) -> Scheduler {
        Scheduler::new(
            SyncJobsService::new(store.cache.clone()),
            ChatSyncStateService::new(store.cache.clone()),
            MessageCache::new(store.cache.clone()),
        )
    }

    #[tokio::test]
    async fn backward_history_on_empty_chat_queues_initial_load_instead() {
        let store = Store::open_in_memory().await.unwrap();
        let sched = scheduler(&store);
        sched.state.get_or_create("100", "private").await.unwrap();

        let job = sched.queue_backward_history("100").await.unwrap().unwrap();
        assert_eq!(job.job_type, JobType::InitialLoad);

        // A second call must not also queue a BackwardHistory job.
        let second = sched.queue_backward_history("100").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn history_complete_chats_never_get_a_backward_job() {
        let store = Store::open_in_memory().await.unwrap();
        let sched = scheduler(&store);
        sched.state.get_or_create("100", "private").await.unwrap();
        sched.state.mark_history_complete("100").await.unwrap();

        assert!(sched.queue_backward_history("100").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn forward_catchup_is_idempotent_per_chat() {
        let store = Store::open_in_memory().await.unwrap();
        let sched = scheduler(&store);
        sched.state.get_or_create("100", "private").await.unwrap();

        assert!(sched.queue_forward_catchup("100").await.unwrap().is_some());
        assert!(sched.queue_forward_catchup("100").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn startup_initialization_runs_in_order() {
        let store = Store::open_in_memory().await.unwrap();
        let sched = scheduler(&store);
        sched.state.get_or_create("100", "private").await.unwrap();

        let summary = sched.initialize_for_startup().await.unwrap();
        assert_eq!(summary.recovered_jobs, 0);
        assert_eq!(summary.forward_catchup_queued, 1);
        assert_eq!(summary.initial_load_queued, 1);
        // Backward history collapses into the same initial-load slot
        // since a Pending InitialLoad already exists for the chat.
        assert_eq!(summary.backward_history_queued, 0);
    }
}
