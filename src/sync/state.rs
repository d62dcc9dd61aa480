// src/sync/state.rs
// Chat-sync-state service: per-chat cursors, history-complete flag, synced
// counters, last-sync timestamps (§4.1, §3.1).

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::{ChatSyncState, SyncPriority};
use crate::store::now;

pub struct ChatSyncStateService {
    pool: SqlitePool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    Forward,
    Backward,
}

impl ChatSyncStateService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, state: &ChatSyncState) -> Result<()> {
        let now = now();
        sqlx::query(
            r#"
            INSERT INTO chat_sync_state (
                chat_id, chat_type, sync_priority, sync_enabled,
                forward_cursor, backward_cursor, history_complete, synced_messages,
                last_forward_sync, last_backward_sync, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET
                chat_type = excluded.chat_type,
                sync_priority = excluded.sync_priority,
                sync_enabled = excluded.sync_enabled,
                forward_cursor = excluded.forward_cursor,
                backward_cursor = excluded.backward_cursor,
                history_complete = excluded.history_complete,
                synced_messages = excluded.synced_messages,
                last_forward_sync = excluded.last_forward_sync,
                last_backward_sync = excluded.last_backward_sync,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&state.chat_id)
        .bind(&state.chat_type)
        .bind(state.sync_priority.as_i64())
        .bind(state.sync_enabled)
        .bind(state.forward_cursor)
        .bind(state.backward_cursor)
        .bind(state.history_complete)
        .bind(state.synced_messages)
        .bind(state.last_forward_sync)
        .bind(state.last_backward_sync)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get(&self, chat_id: &str) -> Result<Option<ChatSyncState>> {
        let row = sqlx::query(SELECT_COLUMNS_WHERE_CHAT_ID).bind(chat_id).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_state(&r)))
    }

    /// Creates a default row if one doesn't exist yet.
    pub async fn get_or_create(&self, chat_id: &str, chat_type: &str) -> Result<ChatSyncState> {
        if let Some(existing) = self.get(chat_id).await? {
            return Ok(existing);
        }
        let fresh = ChatSyncState::new(chat_id, chat_type, now());
        self.upsert(&fresh).await?;
        Ok(fresh)
    }

    pub async fn get_enabled_chats(&self) -> Result<Vec<ChatSyncState>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE sync_enabled = 1"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_state).collect())
    }

    pub async fn get_chats_by_priority(&self, priority: SyncPriority) -> Result<Vec<ChatSyncState>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE sync_priority = ?"))
            .bind(priority.as_i64())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_state).collect())
    }

    pub async fn get_incomplete_history(&self) -> Result<Vec<ChatSyncState>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} WHERE history_complete = 0"))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_state).collect())
    }

    /// CAS-style cursor advance: `update iff candidate > current` (§5
    /// ordering guarantees). Pass `None` to leave a cursor untouched.
    pub async fn update_cursors(
        &self,
        chat_id: &str,
        forward_cursor: Option<i64>,
        backward_cursor: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE chat_sync_state SET
                forward_cursor = CASE
                    WHEN ? IS NULL THEN forward_cursor
                    WHEN forward_cursor IS NULL OR ? > forward_cursor THEN ?
                    ELSE forward_cursor END,
                backward_cursor = CASE
                    WHEN ? IS NULL THEN backward_cursor
                    WHEN backward_cursor IS NULL OR ? < backward_cursor THEN ?
                    ELSE backward_cursor END,
                updated_at = ?
             WHERE chat_id = ?",
        )
        .bind(forward_cursor)
        .bind(forward_cursor)
        .bind(forward_cursor)
        .bind(backward_cursor)
        .bind(backward_cursor)
        .bind(backward_cursor)
        .bind(now())
        .bind(chat_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Once true, not cleared except by explicit `reset_history`.
    pub async fn mark_history_complete(&self, chat_id: &str) -> Result<()> {
        sqlx::query("UPDATE chat_sync_state SET history_complete = 1, updated_at = ? WHERE chat_id = ?")
            .bind(now())
            .bind(chat_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn reset_history(&self, chat_id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE chat_sync_state SET history_complete = 0, backward_cursor = NULL, updated_at = ?
             WHERE chat_id = ?",
        )
        .bind(now())
        .bind(chat_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn increment_synced_messages(&self, chat_id: &str, delta: i64) -> Result<()> {
        sqlx::query(
            "UPDATE chat_sync_state SET synced_messages = synced_messages + ?, updated_at = ? WHERE chat_id = ?",
        )
        .bind(delta)
        .bind(now())
        .bind(chat_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_last_sync(&self, chat_id: &str, direction: SyncDirection) -> Result<()> {
        let now = now();
        let sql = match direction {
            SyncDirection::Forward => {
                "UPDATE chat_sync_state SET last_forward_sync = ?, updated_at = ? WHERE chat_id = ?"
            }
            SyncDirection::Backward => {
                "UPDATE chat_sync_state SET last_backward_sync = ?, updated_at = ? WHERE chat_id = ?"
            }
        };
        sqlx::query(sql).bind(now).bind(now).bind(chat_id).execute(&self.pool).await?;
        Ok(())
    }
}

const SELECT_COLUMNS: &str = "SELECT chat_id, chat_type, sync_priority, sync_enabled,
    forward_cursor, backward_cursor, history_complete, synced_messages,
    last_forward_sync, last_backward_sync, created_at, updated_at
 FROM chat_sync_state";

const SELECT_COLUMNS_WHERE_CHAT_ID: &str = "SELECT chat_id, chat_type, sync_priority, sync_enabled,
    forward_cursor, backward_cursor, history_complete, synced_messages,
    last_forward_sync, last_backward_sync, created_at, updated_at
 FROM chat_sync_state WHERE chat_id = ?";

fn row_to_state(row: &sqlx::sqlite::SqliteRow) -> ChatSyncState {
    ChatSyncState {
        chat_id: row.get("chat_id"),
        chat_type: row.get("chat_type"),
        sync_priority: SyncPriority::from_i64(row.get("sync_priority")),
        sync_enabled: row.get::<i64, _>("sync_enabled") != 0,
        forward_cursor: row.get("forward_cursor"),
        backward_cursor: row.get("backward_cursor"),
        history_complete: row.get::<i64, _>("history_complete") != 0,
        synced_messages: row.get("synced_messages"),
        last_forward_sync: row.get("last_forward_sync"),
        last_backward_sync: row.get("last_backward_sync"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn cursor_update_only_advances_in_the_right_direction() {
        let store = Store::open_in_memory().await.unwrap();
        let svc = ChatSyncStateService::new(store.cache.clone());
        svc.get_or_create("100", "private").await.unwrap();

        svc.update_cursors("100", Some(50), Some(40)).await.unwrap();
        // Stale candidate (lower forward, higher backward) must not regress.
        svc.update_cursors("100", Some(10), Some(60)).await.unwrap();

        let state = svc.get("100").await.unwrap().unwrap();
        assert_eq!(state.forward_cursor, Some(50));
        assert_eq!(state.backward_cursor, Some(40));

        svc.update_cursors("100", Some(90), Some(10)).await.unwrap();
        let state = svc.get("100").await.unwrap().unwrap();
        assert_eq!(state.forward_cursor, Some(90));
        assert_eq!(state.backward_cursor, Some(10));
    }

    #[tokio::test]
    async fn history_complete_is_sticky_until_explicit_reset() {
        let store = Store::open_in_memory().await.unwrap();
        let svc = ChatSyncStateService::new(store.cache.clone());
        svc.get_or_create("100", "private").await.unwrap();
        svc.mark_history_complete("100").await.unwrap();

        svc.update_cursors("100", Some(5), Some(1)).await.unwrap();
        assert!(svc.get("100").await.unwrap().unwrap().history_complete);

        svc.reset_history("100").await.unwrap();
        assert!(!svc.get("100").await.unwrap().unwrap().history_complete);
    }
}
