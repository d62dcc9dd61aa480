// src/cache/chats.rs

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::{normalize_username, Chat, ChatType};
use crate::store::now;

pub struct ChatCache {
    pool: SqlitePool,
}

impl ChatCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, chat: &Chat) -> Result<()> {
        let now = now();
        sqlx::query(
            r#"
            INSERT INTO chats (
                id, chat_type, title, username, member_count, access_token,
                is_creator, is_admin, last_message_id, last_message_at,
                fetched_at, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                chat_type = excluded.chat_type,
                title = excluded.title,
                username = excluded.username,
                member_count = excluded.member_count,
                access_token = excluded.access_token,
                is_creator = excluded.is_creator,
                is_admin = excluded.is_admin,
                last_message_id = excluded.last_message_id,
                last_message_at = excluded.last_message_at,
                fetched_at = excluded.fetched_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&chat.id)
        .bind(chat.chat_type.as_str())
        .bind(&chat.title)
        .bind(&chat.username)
        .bind(chat.member_count)
        .bind(&chat.access_token)
        .bind(chat.is_creator)
        .bind(chat.is_admin)
        .bind(chat.last_message_id)
        .bind(chat.last_message_at)
        .bind(chat.fetched_at)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<Chat>> {
        let row = sqlx::query(
            "SELECT id, chat_type, title, username, member_count, access_token,
                    is_creator, is_admin, last_message_id, last_message_at,
                    fetched_at, created_at, updated_at
             FROM chats WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_chat(&r)))
    }

    /// Case-insensitive, optional `@` prefix.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<Chat>> {
        let normalized = normalize_username(username);
        let row = sqlx::query(
            "SELECT id, chat_type, title, username, member_count, access_token,
                    is_creator, is_admin, last_message_id, last_message_at,
                    fetched_at, created_at, updated_at
             FROM chats WHERE REPLACE(LOWER(username), '@', '') = ?",
        )
        .bind(normalized)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_chat(&r)))
    }

    pub async fn search(&self, query: &str, limit: i64) -> Result<Vec<Chat>> {
        let pattern = format!("%{}%", query.to_lowercase());
        let rows = sqlx::query(
            "SELECT id, chat_type, title, username, member_count, access_token,
                    is_creator, is_admin, last_message_id, last_message_at,
                    fetched_at, created_at, updated_at
             FROM chats
             WHERE LOWER(title) LIKE ? OR LOWER(username) LIKE ?
             ORDER BY last_message_at DESC
             LIMIT ?",
        )
        .bind(&pattern)
        .bind(&pattern)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_chat).collect())
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Chat>> {
        let rows = sqlx::query(
            "SELECT id, chat_type, title, username, member_count, access_token,
                    is_creator, is_admin, last_message_id, last_message_at,
                    fetched_at, created_at, updated_at
             FROM chats
             ORDER BY last_message_at DESC
             LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_chat).collect())
    }
}

fn row_to_chat(row: &sqlx::sqlite::SqliteRow) -> Chat {
    let chat_type_str: String = row.get("chat_type");
    Chat {
        id: row.get("id"),
        chat_type: ChatType::parse(&chat_type_str).unwrap_or(ChatType::Private),
        title: row.get("title"),
        username: row.get("username"),
        member_count: row.get("member_count"),
        access_token: row.get("access_token"),
        is_creator: row.get::<i64, _>("is_creator") != 0,
        is_admin: row.get::<i64, _>("is_admin") != 0,
        last_message_id: row.get("last_message_id"),
        last_message_at: row.get("last_message_at"),
        fetched_at: row.get("fetched_at"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn test_chat(id: &str) -> Chat {
        Chat {
            id: id.to_string(),
            chat_type: ChatType::Group,
            title: Some("Rust Friends".into()),
            username: Some("rustfriends".into()),
            member_count: Some(42),
            access_token: None,
            is_creator: false,
            is_admin: true,
            last_message_id: Some(10),
            last_message_at: Some(1000),
            fetched_at: 1000,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    #[tokio::test]
    async fn upsert_then_search_by_title() {
        let store = Store::open_in_memory().await.unwrap();
        let cache = ChatCache::new(store.cache.clone());
        cache.upsert(&test_chat("100")).await.unwrap();

        let found = cache.search("rust", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "100");
    }

    #[tokio::test]
    async fn username_lookup_case_insensitive_with_at() {
        let store = Store::open_in_memory().await.unwrap();
        let cache = ChatCache::new(store.cache.clone());
        cache.upsert(&test_chat("100")).await.unwrap();

        assert!(cache.get_by_username("@RustFriends").await.unwrap().is_some());
    }
}
