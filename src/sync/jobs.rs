// src/sync/jobs.rs
// Sync-jobs service: atomic job state transitions, priority-ordered claim,
// crash recovery (§4.2). Every operation here is a single transaction; the
// CAS transitions are plain `UPDATE ... WHERE status = ?` guards checked
// via `rows_affected()`, the same idiom the teacher uses for task status
// transitions in `project/tasks/store.rs`, generalized with an explicit
// prior-status guard since sync jobs need real compare-and-set semantics.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::{JobStatus, JobType, SyncJob};
use crate::store::now;

pub struct SyncJobsService {
    pool: SqlitePool,
}

impl SyncJobsService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a Pending row. Caller is responsible for idempotency
    /// (the scheduler pre-checks `has_active_job_for_chat`).
    pub async fn create(&self, chat_id: &str, job_type: JobType, priority: i64) -> Result<SyncJob> {
        let now = now();
        let id = sqlx::query(
            "INSERT INTO sync_jobs (chat_id, job_type, priority, status, messages_fetched, created_at)
             VALUES (?, ?, ?, 'Pending', 0, ?)",
        )
        .bind(chat_id)
        .bind(job_type.as_str())
        .bind(priority)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(self.get(id).await?.expect("just-inserted job must exist"))
    }

    pub async fn get(&self, id: i64) -> Result<Option<SyncJob>> {
        let row = sqlx::query(SELECT_COLUMNS_WHERE_ID).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_job(&r)))
    }

    /// Selects one Pending row ordered by `(priority ASC, created_at ASC)`,
    /// flips it to Running atomically via a conditional UPDATE keyed by the
    /// row id found in the same transaction - prevents two parallel
    /// claimants from ever receiving the same row (§8 property 7).
    pub async fn claim_next_job(&self) -> Result<Option<SyncJob>> {
        let mut tx = self.pool.begin().await?;

        let candidate: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM sync_jobs WHERE status = 'Pending'
             ORDER BY priority ASC, created_at ASC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id,)) = candidate else {
            tx.commit().await?;
            return Ok(None);
        };

        let now = now();
        let result = sqlx::query(
            "UPDATE sync_jobs SET status = 'Running', started_at = ?
             WHERE id = ? AND status = 'Pending'",
        )
        .bind(now)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            // Another claimant in a concurrent transaction won the row.
            tx.commit().await?;
            return Ok(None);
        }

        let row = sqlx::query(SELECT_COLUMNS_WHERE_ID).bind(id).fetch_one(&mut *tx).await?;
        tx.commit().await?;
        Ok(Some(row_to_job(&row)))
    }

    /// CAS from Pending.
    pub async fn mark_running(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sync_jobs SET status = 'Running', started_at = ? WHERE id = ? AND status = 'Pending'",
        )
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// CAS from Running.
    pub async fn mark_completed(&self, id: i64) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sync_jobs SET status = 'Completed', completed_at = ? WHERE id = ? AND status = 'Running'",
        )
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// CAS from Running.
    pub async fn mark_failed(&self, id: i64, error_message: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE sync_jobs SET status = 'Failed', error_message = ?, completed_at = ?
             WHERE id = ? AND status = 'Running'",
        )
        .bind(error_message)
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Adds `messages_fetched_delta` and advances `cursor_start`/`cursor_end`.
    pub async fn update_progress(
        &self,
        id: i64,
        cursor_start: Option<i64>,
        cursor_end: Option<i64>,
        messages_fetched_delta: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE sync_jobs SET cursor_start = COALESCE(?, cursor_start),
                                   cursor_end = COALESCE(?, cursor_end),
                                   messages_fetched = messages_fetched + ?
             WHERE id = ?",
        )
        .bind(cursor_start)
        .bind(cursor_end)
        .bind(messages_fetched_delta)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reassigns every Running row to Pending with the crash-marker
    /// message; returns the count reverted (§4.2, §7, §8 property 8).
    pub async fn recover_crashed_jobs(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE sync_jobs SET status = 'Pending', error_message = ?
             WHERE status = 'Running'",
        )
        .bind("daemon crashed during execution")
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn cancel_pending_for_chat(&self, chat_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM sync_jobs WHERE chat_id = ? AND status = 'Pending'")
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn cleanup_completed(&self, max_age_seconds: i64) -> Result<u64> {
        let cutoff = now() - max_age_seconds;
        let result = sqlx::query("DELETE FROM sync_jobs WHERE status = 'Completed' AND completed_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn cleanup_failed(&self, max_age_seconds: i64) -> Result<u64> {
        let cutoff = now() - max_age_seconds;
        let result = sqlx::query("DELETE FROM sync_jobs WHERE status = 'Failed' AND completed_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn has_active_job_for_chat(&self, chat_id: &str, job_type: JobType) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sync_jobs
             WHERE chat_id = ? AND job_type = ? AND status IN ('Pending', 'Running')",
        )
        .bind(chat_id)
        .bind(job_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    /// Aggregated pending-by-(type,priority) counts and a separate running
    /// count, for `Scheduler::get_status` (§4.3).
    pub async fn status_counts(&self) -> Result<JobStatusCounts> {
        let pending_rows = sqlx::query(
            "SELECT job_type, priority, COUNT(*) as n FROM sync_jobs
             WHERE status = 'Pending' GROUP BY job_type, priority",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut pending = Vec::new();
        for row in pending_rows {
            let job_type: String = row.get("job_type");
            pending.push(PendingCount {
                job_type: JobType::parse(&job_type).unwrap_or(JobType::ForwardCatchup),
                priority: row.get("priority"),
                count: row.get("n"),
            });
        }

        let running: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sync_jobs WHERE status = 'Running'")
            .fetch_one(&self.pool)
            .await?;

        Ok(JobStatusCounts { pending, running: running.0 })
    }
}

#[derive(Debug, Clone)]
pub struct PendingCount {
    pub job_type: JobType,
    pub priority: i64,
    pub count: i64,
}

#[derive(Debug, Clone)]
pub struct JobStatusCounts {
    pub pending: Vec<PendingCount>,
    pub running: i64,
}

const SELECT_COLUMNS_WHERE_ID: &str = "SELECT id, chat_id, job_type, priority, status, cursor_start,
    cursor_end, messages_fetched, error_message, created_at, started_at, completed_at
 FROM sync_jobs WHERE id = ?";

fn row_to_job(row: &sqlx::sqlite::SqliteRow) -> SyncJob {
    let job_type: String = row.get("job_type");
    let status: String = row.get("status");
    SyncJob {
        id: row.get("id"),
        chat_id: row.get("chat_id"),
        job_type: JobType::parse(&job_type).unwrap_or(JobType::ForwardCatchup),
        priority: row.get("priority"),
        status: JobStatus::parse(&status).unwrap_or(JobStatus::Pending),
        cursor_start: row.get("cursor_start"),
        cursor_end: row.get("cursor_end"),
        messages_fetched: row.get("messages_fetched"),
        error_message: row.get("error_message"),
        created_at: row.get("created_at"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn claim_next_job_respects_priority_order() {
        let store = Store::open_in_memory().await.unwrap();
        let jobs = SyncJobsService::new(store.cache.clone());

        jobs.create("100", JobType::BackwardHistory, 4).await.unwrap(); // Background
        jobs.create("200", JobType::ForwardCatchup, 0).await.unwrap(); // Realtime
        jobs.create("300", JobType::InitialLoad, 2).await.unwrap(); // Medium

        let next = jobs.claim_next_job().await.unwrap().unwrap();
        assert_eq!(next.chat_id, "200");
        assert_eq!(next.status, JobStatus::Running);
    }

    #[tokio::test]
    async fn claim_never_returns_the_same_job_twice() {
        let store = Store::open_in_memory().await.unwrap();
        let jobs = SyncJobsService::new(store.cache.clone());
        jobs.create("100", JobType::ForwardCatchup, 0).await.unwrap();

        let first = jobs.claim_next_job().await.unwrap();
        let second = jobs.claim_next_job().await.unwrap();
        assert!(first.is_some());
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn transitions_are_cas_guarded() {
        let store = Store::open_in_memory().await.unwrap();
        let jobs = SyncJobsService::new(store.cache.clone());
        let job = jobs.create("100", JobType::ForwardCatchup, 0).await.unwrap();

        // Can't complete a job that never started running.
        assert!(!jobs.mark_completed(job.id).await.unwrap());

        assert!(jobs.mark_running(job.id).await.unwrap());
        assert!(!jobs.mark_running(job.id).await.unwrap()); // already Running

        assert!(jobs.mark_completed(job.id).await.unwrap());
        assert!(!jobs.mark_failed(job.id, "late").await.unwrap()); // already terminal
    }

    #[tokio::test]
    async fn recover_crashed_jobs_reverts_running_to_pending() {
        let store = Store::open_in_memory().await.unwrap();
        let jobs = SyncJobsService::new(store.cache.clone());
        let a = jobs.create("100", JobType::ForwardCatchup, 0).await.unwrap();
        let b = jobs.create("200", JobType::ForwardCatchup, 0).await.unwrap();
        jobs.mark_running(a.id).await.unwrap();
        jobs.mark_running(b.id).await.unwrap();

        let recovered = jobs.recover_crashed_jobs().await.unwrap();
        assert_eq!(recovered, 2);

        let a_after = jobs.get(a.id).await.unwrap().unwrap();
        assert_eq!(a_after.status, JobStatus::Pending);
        assert_eq!(a_after.error_message.as_deref(), Some("daemon crashed during execution"));
    }
}
