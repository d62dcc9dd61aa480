// src/cache/users.rs

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::{normalize_phone, normalize_username, User};
use crate::store::now;

pub struct UserCache {
    pool: SqlitePool,
}

impl UserCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert if new, merge/overwrite if present, preserving `created_at`.
    pub async fn upsert(&self, user: &User) -> Result<()> {
        let now = now();
        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, first_name, last_name, phone, access_token,
                is_contact, is_bot, is_premium, fetched_at, raw_payload,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                first_name = excluded.first_name,
                last_name = excluded.last_name,
                phone = excluded.phone,
                access_token = excluded.access_token,
                is_contact = excluded.is_contact,
                is_bot = excluded.is_bot,
                is_premium = excluded.is_premium,
                fetched_at = excluded.fetched_at,
                raw_payload = excluded.raw_payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.phone)
        .bind(&user.access_token)
        .bind(user.is_contact)
        .bind(user.is_bot)
        .bind(user.is_premium)
        .bind(user.fetched_at)
        .bind(&user.raw_payload)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_batch(&self, users: &[User]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let now = now();

        for user in users {
            sqlx::query(
                r#"
                INSERT INTO users (
                    id, username, first_name, last_name, phone, access_token,
                    is_contact, is_bot, is_premium, fetched_at, raw_payload,
                    created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    username = excluded.username,
                    first_name = excluded.first_name,
                    last_name = excluded.last_name,
                    phone = excluded.phone,
                    access_token = excluded.access_token,
                    is_contact = excluded.is_contact,
                    is_bot = excluded.is_bot,
                    is_premium = excluded.is_premium,
                    fetched_at = excluded.fetched_at,
                    raw_payload = excluded.raw_payload,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&user.id)
            .bind(&user.username)
            .bind(&user.first_name)
            .bind(&user.last_name)
            .bind(&user.phone)
            .bind(&user.access_token)
            .bind(user.is_contact)
            .bind(user.is_bot)
            .bind(user.is_premium)
            .bind(user.fetched_at)
            .bind(&user.raw_payload)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, first_name, last_name, phone, access_token,
                    is_contact, is_bot, is_premium, fetched_at, raw_payload,
                    created_at, updated_at
             FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_user(&r)))
    }

    /// Case-insensitive username lookup, optional leading `@` stripped.
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        let normalized = normalize_username(username);
        let row = sqlx::query(
            "SELECT id, username, first_name, last_name, phone, access_token,
                    is_contact, is_bot, is_premium, fetched_at, raw_payload,
                    created_at, updated_at
             FROM users WHERE REPLACE(LOWER(username), '@', '') = ?",
        )
        .bind(normalized)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_user(&r)))
    }

    /// Normalizes both sides in Rust rather than in SQL: stored phone
    /// numbers may carry any punctuation, and `normalize_phone` strips
    /// all non-digit characters, not just a fixed set.
    pub async fn get_by_phone(&self, phone: &str) -> Result<Option<User>> {
        let normalized = normalize_phone(phone);
        let rows = sqlx::query(
            "SELECT id, username, first_name, last_name, phone, access_token,
                    is_contact, is_bot, is_premium, fetched_at, raw_payload,
                    created_at, updated_at
             FROM users WHERE phone IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(row_to_user)
            .find(|u| u.phone.as_deref().map(normalize_phone).as_deref() == Some(normalized.as_str())))
    }

    pub async fn list_contacts(&self, limit: i64, offset: i64) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, username, first_name, last_name, phone, access_token,
                    is_contact, is_bot, is_premium, fetched_at, raw_payload,
                    created_at, updated_at
             FROM users WHERE is_contact = 1
             ORDER BY first_name ASC
             LIMIT ? OFFSET ?",
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_user).collect())
    }
}

fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        phone: row.get("phone"),
        access_token: row.get("access_token"),
        is_contact: row.get::<i64, _>("is_contact") != 0,
        is_bot: row.get::<i64, _>("is_bot") != 0,
        is_premium: row.get::<i64, _>("is_premium") != 0,
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

    fn test_user(id: &str) -> User {
        User {
            id: id.to_string(),
            username: Some("@Ada".into()),
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            phone: Some("+1 (555) 000-0001".into()),
            access_token: None,
            is_contact: true,
            is_bot: false,
            is_premium: false,
            fetched_at: 1000,
            raw_payload: None,
            created_at: 1000,
            updated_at: 1000,
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_preserves_created_at() {
        let store = Store::open_in_memory().await.unwrap();
        let cache = UserCache::new(store.cache.clone());

        cache.upsert(&test_user("1")).await.unwrap();
        let first = cache.get("1").await.unwrap().unwrap();

        let mut updated = test_user("1");
        updated.first_name = Some("Augusta".into());
        cache.upsert(&updated).await.unwrap();
        let second = cache.get("1").await.unwrap().unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.first_name.as_deref(), Some("Augusta"));

        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&store.cache)
            .await
            .unwrap();
        assert_eq!(count.0, 1);
    }

    #[tokio::test]
    async fn username_lookup_is_case_insensitive() {
        let store = Store::open_in_memory().await.unwrap();
        let cache = UserCache::new(store.cache.clone());
        cache.upsert(&test_user("1")).await.unwrap();

        assert!(cache.get_by_username("ada").await.unwrap().is_some());
        assert!(cache.get_by_username("@ADA").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn phone_lookup_ignores_stored_punctuation() {
        let store = Store::open_in_memory().await.unwrap();
        let cache = UserCache::new(store.cache.clone());
        cache.upsert(&test_user("1")).await.unwrap();

        let found = cache.get_by_phone("15550000001").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some("1".to_string()));
    }
}
