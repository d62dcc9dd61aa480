// src/models/daemon_status.rs

use serde::{Deserialize, Serialize};

/// Singleton daemon status row (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonStatus {
    pub started_at: i64,
    pub last_update: i64,
    pub connected_accounts: i64,
    pub total_accounts: i64,
    pub messages_synced: i64,
}
