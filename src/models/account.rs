// src/models/account.rs

use serde::{Deserialize, Serialize};

/// A persistent account identity (§3.1). At most one account is active at
/// a time; `AccountsService::set_active` atomically clears the flag on
/// every other row in the same transaction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: i64,
    pub phone: String,
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub label: Option<String>,
    pub session_blob: Option<Vec<u8>>,
    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}
