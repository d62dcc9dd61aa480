// src/sync/rate_limits.rs
// Rate-limit tracker: persisted sliding-window call log plus flood-wait
// blocks with absolute expiry (§4.6). Deliberately not built on the
// teacher's `governor`-based `RateLimiter` util (in-memory token bucket) -
// the spec needs a durable window that survives a restart and a per-method
// flood-wait with an absolute unblock time, so the window itself is a
// plain row-per-call table pruned on read, grounded in the same
// query-at-call-site idiom as `cache/messages.rs`.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::{FloodWaitBlock, RateLimitStatus};
use crate::store::now;

const WINDOW_SECONDS: i64 = 60;

pub struct RateLimitsService {
    pool: SqlitePool,
}

impl RateLimitsService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Appends a call record. Call this immediately before issuing the
    /// remote request, not after it returns - a call that results in a
    /// flood-wait still consumed the slot the remote side is counting.
    pub async fn record_call(&self, method: &str) -> Result<()> {
        sqlx::query("INSERT INTO rate_limit_calls (method, called_at) VALUES (?, ?)")
            .bind(method)
            .bind(now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// True if `method` has an active flood-wait block, or if the
    /// rolling 60s window already holds a caller-supplied ceiling worth
    /// of calls (see `calls_within_window`).
    pub async fn is_blocked(&self, method: &str) -> Result<bool> {
        Ok(self.get_wait_time(method).await? > 0)
    }

    /// Seconds remaining until `method` is callable again; 0 if clear.
    /// Only flood-wait blocks gate calls here - window-based throttling
    /// is a caller decision (`calls_within_window` vs its own ceiling),
    /// matching §4.6's split between "hard" remote blocks and "soft"
    /// local pacing.
    pub async fn get_wait_time(&self, method: &str) -> Result<i64> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT blocked_until FROM rate_limit_blocks WHERE method = ?")
                .bind(method)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((blocked_until,)) => {
                let remaining = blocked_until - now();
                if remaining > 0 {
                    Ok(remaining)
                } else {
                    sqlx::query("DELETE FROM rate_limit_blocks WHERE method = ?")
                        .bind(method)
                        .execute(&self.pool)
                        .await?;
                    Ok(0)
                }
            }
            None => Ok(0),
        }
    }

    /// Records a remote-imposed flood-wait, overwriting any existing
    /// block for the same method with the new expiry.
    pub async fn set_flood_wait(&self, method: &str, seconds: i64) -> Result<()> {
        let blocked_until = now() + seconds;
        sqlx::query(
            "INSERT INTO rate_limit_blocks (method, blocked_until, wait_seconds) VALUES (?, ?, ?)
             ON CONFLICT(method) DO UPDATE SET blocked_until = excluded.blocked_until,
                                                wait_seconds = excluded.wait_seconds",
        )
        .bind(method)
        .bind(blocked_until)
        .bind(seconds)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Count of calls to `method` within the trailing 60s window, for a
    /// caller that wants to self-pace below some per-method ceiling.
    pub async fn calls_within_window(&self, method: &str) -> Result<i64> {
        let cutoff = now() - WINDOW_SECONDS;
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM rate_limit_calls WHERE method = ? AND called_at >= ?",
        )
        .bind(method)
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Full status snapshot for `sql print-schema` / daemon status (§4.6).
    pub async fn get_status(&self) -> Result<RateLimitStatus> {
        let cutoff = now() - WINDOW_SECONDS;
        self.prune_calls_older_than(cutoff).await?;

        let rows = sqlx::query(
            "SELECT method, COUNT(*) as n FROM rate_limit_calls WHERE called_at >= ? GROUP BY method",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        let mut calls_by_method = std::collections::HashMap::new();
        let mut total_calls = 0i64;
        for row in rows {
            let method: String = row.get("method");
            let n: i64 = row.get("n");
            total_calls += n;
            calls_by_method.insert(method, n);
        }

        let now = now();
        let block_rows = sqlx::query(
            "SELECT method, blocked_until, wait_seconds FROM rate_limit_blocks WHERE blocked_until > ?",
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let active_flood_waits = block_rows
            .iter()
            .map(|row| FloodWaitBlock {
                method: row.get("method"),
                blocked_until: row.get("blocked_until"),
                wait_seconds: row.get("wait_seconds"),
            })
            .collect();

        Ok(RateLimitStatus { total_calls, calls_by_method, active_flood_waits })
    }

    /// Drops call records older than the window so the log doesn't grow
    /// unbounded; safe to call on every status read.
    pub async fn prune_calls_older_than(&self, cutoff: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM rate_limit_calls WHERE called_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn flood_wait_blocks_until_expiry_then_clears() {
        let store = Store::open_in_memory().await.unwrap();
        let svc = RateLimitsService::new(store.cache.clone());

        assert!(!svc.is_blocked("messages.getHistory").await.unwrap());
        svc.set_flood_wait("messages.getHistory", 30).await.unwrap();
        assert!(svc.is_blocked("messages.getHistory").await.unwrap());
        let wait = svc.get_wait_time("messages.getHistory").await.unwrap();
        assert!(wait > 0 && wait <= 30);
    }

    #[tokio::test]
    async fn calls_within_window_counts_recorded_calls() {
        let store = Store::open_in_memory().await.unwrap();
        let svc = RateLimitsService::new(store.cache.clone());
        for _ in 0..5 {
            svc.record_call("messages.getHistory").await.unwrap();
        }
        assert_eq!(svc.calls_within_window("messages.getHistory").await.unwrap(), 5);
        assert_eq!(svc.calls_within_window("messages.send").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn flood_wait_is_overwritten_not_accumulated() {
        let store = Store::open_in_memory().await.unwrap();
        let svc = RateLimitsService::new(store.cache.clone());
        svc.set_flood_wait("messages.send", 10).await.unwrap();
        svc.set_flood_wait("messages.send", 5).await.unwrap();
        let wait = svc.get_wait_time("messages.send").await.unwrap();
        assert!(wait <= 5);
    }
}
