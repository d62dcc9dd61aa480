// src/accounts/mod.rs
// Account identity CRUD against `accounts.db` (§3.1). Session-blob
// storage and login flows live with the remote transport, out of scope
// here; this service only owns the row.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::models::{normalize_phone, Account};
use crate::store::now;

pub struct AccountsService {
    pool: SqlitePool,
}

impl AccountsService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, phone: &str, display_name: Option<&str>) -> Result<Account> {
        let now = now();
        let id = sqlx::query(
            "INSERT INTO accounts (phone, display_name, is_active, created_at, updated_at)
             VALUES (?, ?, 0, ?, ?)",
        )
        .bind(phone)
        .bind(display_name)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(self.get(id).await?.expect("just-inserted account must exist"))
    }

    pub async fn get(&self, id: i64) -> Result<Option<Account>> {
        let row = sqlx::query(SELECT_COLUMNS_WHERE_ID).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_account(&r)))
    }

    /// Normalizes both sides in Rust rather than in SQL: stored phone
    /// numbers may carry any punctuation, and `normalize_phone` strips
    /// all non-digit characters, not just a fixed set.
    pub async fn get_by_phone(&self, phone: &str) -> Result<Option<Account>> {
        let normalized = normalize_phone(phone);
        let all = self.list().await?;
        Ok(all.into_iter().find(|a| normalize_phone(&a.phone) == normalized))
    }

    pub async fn list(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!("{SELECT_COLUMNS} ORDER BY id ASC")).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_account).collect())
    }

    pub async fn get_active(&self) -> Result<Option<Account>> {
        let row = sqlx::query(&format!("{SELECT_COLUMNS} WHERE is_active = 1")).fetch_optional(&self.pool).await?;
        Ok(row.map(|r| row_to_account(&r)))
    }

    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM accounts").fetch_one(&self.pool).await?;
        Ok(row.0)
    }

    /// Atomically clears `is_active` on every other row before setting it
    /// on `id`, all within one transaction (§3.1 "at most one active").
    /// The clear only commits if `id` actually exists, so a call with a
    /// bad id leaves the previously-active account untouched.
    pub async fn set_active(&self, id: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("UPDATE accounts SET is_active = 0, updated_at = ? WHERE is_active = 1")
            .bind(now())
            .execute(&mut *tx)
            .await?;

        let result = sqlx::query("UPDATE accounts SET is_active = 1, updated_at = ? WHERE id = ?")
            .bind(now())
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }
}

const SELECT_COLUMNS: &str = "SELECT id, phone, display_name, username, label, session_blob,
    is_active, created_at, updated_at FROM accounts";

const SELECT_COLUMNS_WHERE_ID: &str = "SELECT id, phone, display_name, username, label, session_blob,
    is_active, created_at, updated_at FROM accounts WHERE id = ?";

fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Account {
    Account {
        id: row.get("id"),
        phone: row.get("phone"),
        display_name: row.get("display_name"),
        username: row.get("username"),
        label: row.get("label"),
        session_blob: row.get("session_blob"),
        is_active: row.get::<i64, _>("is_active") != 0,
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    #[tokio::test]
    async fn set_active_clears_every_other_account() {
        let store = Store::open_in_memory().await.unwrap();
        let svc = AccountsService::new(store.accounts.clone());
        let a = svc.create("15551234567", Some("Ada")).await.unwrap();
        let b = svc.create("15557654321", Some("Bea")).await.unwrap();

        svc.set_active(a.id).await.unwrap();
        svc.set_active(b.id).await.unwrap();

        let a_after = svc.get(a.id).await.unwrap().unwrap();
        let b_after = svc.get(b.id).await.unwrap().unwrap();
        assert!(!a_after.is_active);
        assert!(b_after.is_active);
    }

    #[tokio::test]
    async fn phone_lookup_normalizes_punctuation() {
        let store = Store::open_in_memory().await.unwrap();
        let svc = AccountsService::new(store.accounts.clone());
        svc.create("+1 (555) 123-4567", None).await.unwrap();

        let found = svc.get_by_phone("15551234567").await.unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn set_active_with_unknown_id_leaves_current_active_account_alone() {
        let store = Store::open_in_memory().await.unwrap();
        let svc = AccountsService::new(store.accounts.clone());
        let a = svc.create("15551234567", Some("Ada")).await.unwrap();
        svc.set_active(a.id).await.unwrap();

        let ok = svc.set_active(9999).await.unwrap();
        assert!(!ok);

        let a_after = svc.get(a.id).await.unwrap().unwrap();
        assert!(a_after.is_active);
    }
}
