// src/cache/messages.rs
// Message cache: upsert, batch upsert (one transaction), cursor queries,
// tombstone deletes, FTS search with chat/sender metadata join (§4.1).

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::Message;
use crate::store::{escape_fts_query, now};

pub struct MessageCache {
    pool: SqlitePool,
}

/// Filters accepted by `list`.
#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub chat_id: Option<String>,
    pub include_deleted: bool,
}

/// Filters accepted by `search` (§4.1: `chatId | chatUsername | senderId |
/// senderUsername | includeDeleted`).
#[derive(Debug, Clone, Default)]
pub struct MessageSearchFilter {
    pub chat_id: Option<String>,
    pub chat_username: Option<String>,
    pub sender_id: Option<String>,
    pub sender_username: Option<String>,
    pub include_deleted: bool,
}

/// A search hit joined with chat/sender metadata.
#[derive(Debug, Clone)]
pub struct MessageSearchHit {
    pub message: Message,
    pub chat_title: Option<String>,
    pub sender_username: Option<String>,
}

impl MessageCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, message: &Message) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        upsert_one(&mut tx, message).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Batch form is one transaction (§4.1).
    pub async fn upsert_batch(&self, messages: &[Message]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for message in messages {
            upsert_one(&mut tx, message).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, chat_id: &str, message_id: i64) -> Result<Option<Message>> {
        let row = sqlx::query(SELECT_COLUMNS_WHERE_PK)
            .bind(chat_id)
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| row_to_message(&r)))
    }

    pub async fn list(&self, filter: &MessageFilter, limit: i64, offset: i64) -> Result<Vec<Message>> {
        let mut sql = String::from(
            "SELECT chat_id, message_id, sender_id, text, message_type, has_media,
                    reply_to_id, forward_from_id, is_outgoing, is_edited, is_pinned,
                    is_deleted, date, edit_date, fetched_at, raw_payload, created_at, updated_at
             FROM messages WHERE 1=1",
        );
        if filter.chat_id.is_some() {
            sql.push_str(" AND chat_id = ?");
        }
        if !filter.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }
        sql.push_str(" ORDER BY date DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(chat_id) = &filter.chat_id {
            query = query.bind(chat_id);
        }
        query = query.bind(limit).bind(offset);

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_message).collect())
    }

    pub async fn count_by_chat_id(&self, chat_id: &str) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE chat_id = ? AND is_deleted = 0",
        )
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn get_latest_message_id(&self, chat_id: &str) -> Result<Option<i64>> {
        let row: (Option<i64>,) = sqlx::query_as(
            "SELECT MAX(message_id) FROM messages WHERE chat_id = ? AND is_deleted = 0",
        )
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    pub async fn get_oldest_message_id(&self, chat_id: &str) -> Result<Option<i64>> {
        let row: (Option<i64>,) = sqlx::query_as(
            "SELECT MIN(message_id) FROM messages WHERE chat_id = ? AND is_deleted = 0",
        )
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Tombstones the given message ids within a chat.
    pub async fn mark_deleted(&self, chat_id: &str, message_ids: &[i64]) -> Result<u64> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut affected = 0u64;
        for id in message_ids {
            let result = sqlx::query(
                "UPDATE messages SET is_deleted = 1, updated_at = ? WHERE chat_id = ? AND message_id = ?",
            )
            .bind(now())
            .bind(chat_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
            affected += result.rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    /// Tombstones every row matching any of the given message ids, with no
    /// chat context - used for private/small-group deletes that omit the
    /// chat id (§4.1, §4.7).
    pub async fn mark_deleted_by_message_ids(&self, message_ids: &[i64]) -> Result<u64> {
        if message_ids.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        let mut affected = 0u64;
        for id in message_ids {
            let result = sqlx::query(
                "UPDATE messages SET is_deleted = 1, updated_at = ? WHERE message_id = ?",
            )
            .bind(now())
            .bind(id)
            .execute(&mut *tx)
            .await?;
            affected += result.rows_affected();
        }
        tx.commit().await?;
        Ok(affected)
    }

    /// Sets `is_edited=1` (§4.1).
    pub async fn update_text(
        &self,
        chat_id: &str,
        message_id: i64,
        text: &str,
        edit_date: i64,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE messages SET text = ?, edit_date = ?, is_edited = 1, updated_at = ?
             WHERE chat_id = ? AND message_id = ?",
        )
        .bind(text)
        .bind(edit_date)
        .bind(now())
        .bind(chat_id)
        .bind(message_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE messages_fts SET text = ? WHERE chat_id = ? AND message_id = ?")
            .bind(text)
            .bind(chat_id)
            .bind(message_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    /// Full-text search joined with chat/sender metadata. Ordering:
    /// `date DESC`. The query is escaped (§4.1) so no input character
    /// receives special meaning in the FTS5 grammar.
    pub async fn search(
        &self,
        query: &str,
        filter: &MessageSearchFilter,
        limit: i64,
    ) -> Result<Vec<MessageSearchHit>> {
        let escaped = escape_fts_query(query);

        let mut sql = String::from(
            "SELECT m.chat_id, m.message_id, m.sender_id, m.text, m.message_type, m.has_media,
                    m.reply_to_id, m.forward_from_id, m.is_outgoing, m.is_edited, m.is_pinned,
                    m.is_deleted, m.date, m.edit_date, m.fetched_at, m.raw_payload,
                    m.created_at, m.updated_at,
                    c.title AS chat_title, u.username AS sender_username
             FROM messages_fts f
             JOIN messages m ON m.chat_id = f.chat_id AND m.message_id = f.message_id
             LEFT JOIN chats c ON c.id = m.chat_id
             LEFT JOIN users u ON u.id = m.sender_id
             WHERE messages_fts MATCH ?",
        );

        if filter.chat_id.is_some() {
            sql.push_str(" AND m.chat_id = ?");
        }
        if filter.chat_username.is_some() {
            sql.push_str(" AND REPLACE(LOWER(c.username), '@', '') = ?");
        }
        if filter.sender_id.is_some() {
            sql.push_str(" AND m.sender_id = ?");
        }
        if filter.sender_username.is_some() {
            sql.push_str(" AND REPLACE(LOWER(u.username), '@', '') = ?");
        }
        if !filter.include_deleted {
            sql.push_str(" AND m.is_deleted = 0");
        }
        sql.push_str(" ORDER BY m.date DESC LIMIT ?");

        let mut q = sqlx::query(&sql).bind(escaped);
        if let Some(v) = &filter.chat_id {
            q = q.bind(v);
        }
        if let Some(v) = &filter.chat_username {
            q = q.bind(crate::models::normalize_username(v));
        }
        if let Some(v) = &filter.sender_id {
            q = q.bind(v);
        }
        if let Some(v) = &filter.sender_username {
            q = q.bind(crate::models::normalize_username(v));
        }
        q = q.bind(limit);

        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|r| MessageSearchHit {
                message: row_to_message(r),
                chat_title: r.get("chat_title"),
                sender_username: r.get("sender_username"),
            })
            .collect())
    }
}

const SELECT_COLUMNS_WHERE_PK: &str = "SELECT chat_id, message_id, sender_id, text, message_type, has_media,
    reply_to_id, forward_from_id, is_outgoing, is_edited, is_pinned,
    is_deleted, date, edit_date, fetched_at, raw_payload, created_at, updated_at
 FROM messages WHERE chat_id = ? AND message_id = ?";

async fn upsert_one(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, message: &Message) -> Result<()> {
    let now = now();
    sqlx::query(
        r#"
        INSERT INTO messages (
            chat_id, message_id, sender_id, text, message_type, has_media,
            reply_to_id, forward_from_id, is_outgoing, is_edited, is_pinned,
            is_deleted, date, edit_date, fetched_at, raw_payload, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(chat_id, message_id) DO UPDATE SET
            sender_id = excluded.sender_id,
            text = excluded.text,
            message_type = excluded.message_type,
            has_media = excluded.has_media,
            reply_to_id = excluded.reply_to_id,
            forward_from_id = excluded.forward_from_id,
            is_outgoing = excluded.is_outgoing,
            is_edited = excluded.is_edited,
            is_pinned = excluded.is_pinned,
            is_deleted = excluded.is_deleted,
            date = excluded.date,
            edit_date = excluded.edit_date,
            fetched_at = excluded.fetched_at,
            raw_payload = excluded.raw_payload,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&message.chat_id)
    .bind(message.message_id)
    .bind(&message.sender_id)
    .bind(&message.text)
    .bind(&message.message_type)
    .bind(message.has_media)
    .bind(message.reply_to_id)
    .bind(&message.forward_from_id)
    .bind(message.is_outgoing)
    .bind(message.is_edited)
    .bind(message.is_pinned)
    .bind(message.is_deleted)
    .bind(message.date)
    .bind(message.edit_date)
    .bind(message.fetched_at)
    .bind(&message.raw_payload)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    // fts5 has no upsert semantics; replace the indexed row outright.
    sqlx::query("DELETE FROM messages_fts WHERE chat_id = ? AND message_id = ?")
        .bind(&message.chat_id)
        .bind(message.message_id)
        .execute(&mut **tx)
        .await?;
    sqlx::query("INSERT INTO messages_fts (chat_id, message_id, text) VALUES (?, ?, ?)")
        .bind(&message.chat_id)
        .bind(message.message_id)
        .bind(message.text.as_deref().unwrap_or(""))
        .execute(&mut **tx)
        .await?;

    Ok(())
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Message {
    Message {
        chat_id: row.get("chat_id"),
        message_id: row.get("message_id"),
        sender_id: row.get("sender_id"),
        text: row.get("text"),
        message_type: row.get("message_type"),
        has_media: row.get::<i64, _>("has_media") != 0,
        reply_to_id: row.get("reply_to_id"),
        forward_from_id: row.get("forward_from_id"),
        is_outgoing: row.get::<i64, _>("is_outgoing") != 0,
        is_edited: row.get::<i64, _>("is_edited") != 0,
        is_pinned: row.get::<i64, _>("is_pinned") != 0,
        is_deleted: row.get::<i64, _>("is_deleted") != 0,
        date: row.get("date"),
        edit_date: row.get("edit_date"),
        fetched_at: row.get("fetched_at"),
        raw_payload: row.get("raw_payload"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn msg(chat_id: &str, id: i64, text: &str, date: i64) -> Message {
        let mut m = Message::new_incoming(chat_id, id, date);
        m.text = Some(text.to_string());
        m
    }

    #[tokio::test]
    async fn upsert_batch_is_one_transaction_and_cursor_queries_work() {
        let store = Store::open_in_memory().await.unwrap();
        let cache = MessageCache::new(store.cache.clone());

        let batch = vec![msg("100", 91, "hello", 10), msg("100", 100, "world", 20)];
        cache.upsert_batch(&batch).await.unwrap();

        assert_eq!(cache.get_latest_message_id("100").await.unwrap(), Some(100));
        assert_eq!(cache.get_oldest_message_id("100").await.unwrap(), Some(91));
        assert_eq!(cache.count_by_chat_id("100").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn mark_deleted_is_a_tombstone_excluded_from_list() {
        let store = Store::open_in_memory().await.unwrap();
        let cache = MessageCache::new(store.cache.clone());
        cache.upsert(&msg("100", 1, "hi", 10)).await.unwrap();

        cache.mark_deleted("100", &[1]).await.unwrap();

        let visible = cache
            .list(&MessageFilter { chat_id: Some("100".into()), include_deleted: false }, 10, 0)
            .await
            .unwrap();
        assert!(visible.is_empty());

        let with_deleted = cache
            .list(&MessageFilter { chat_id: Some("100".into()), include_deleted: true }, 10, 0)
            .await
            .unwrap();
        assert_eq!(with_deleted.len(), 1);
        assert!(with_deleted[0].is_deleted);
    }

    #[tokio::test]
    async fn mark_deleted_by_message_ids_ignores_chat_context() {
        let store = Store::open_in_memory().await.unwrap();
        let cache = MessageCache::new(store.cache.clone());
        cache.upsert(&msg("100", 1, "hi", 10)).await.unwrap();
        cache.upsert(&msg("200", 1, "yo", 20)).await.unwrap();

        let affected = cache.mark_deleted_by_message_ids(&[1]).await.unwrap();
        assert_eq!(affected, 2);
    }

    #[tokio::test]
    async fn update_text_sets_is_edited() {
        let store = Store::open_in_memory().await.unwrap();
        let cache = MessageCache::new(store.cache.clone());
        cache.upsert(&msg("100", 1, "hi", 10)).await.unwrap();

        let changed = cache.update_text("100", 1, "hi there", 99).await.unwrap();
        assert!(changed);

        let updated = cache.get("100", 1).await.unwrap().unwrap();
        assert!(updated.is_edited);
        assert_eq!(updated.text.as_deref(), Some("hi there"));
        assert_eq!(updated.edit_date, Some(99));
    }

    #[tokio::test]
    async fn search_finds_text_and_escapes_special_characters() {
        let store = Store::open_in_memory().await.unwrap();
        let cache = MessageCache::new(store.cache.clone());
        cache.upsert(&msg("100", 1, "rust is fun (really)", 10)).await.unwrap();

        let hits = cache
            .search("rust", &MessageSearchFilter::default(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
    }
}
