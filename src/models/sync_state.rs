// src/models/sync_state.rs

use serde::{Deserialize, Serialize};

/// Job/chat priority, lower integer = higher urgency (§3.1).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SyncPriority {
    Realtime = 0,
    High = 1,
    Medium = 2,
    Low = 3,
    Background = 4,
}

impl SyncPriority {
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    pub fn from_i64(v: i64) -> Self {
        match v {
            0 => SyncPriority::Realtime,
            1 => SyncPriority::High,
            2 => SyncPriority::Medium,
            3 => SyncPriority::Low,
            _ => SyncPriority::Background,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncPriority::Realtime => "realtime",
            SyncPriority::High => "high",
            SyncPriority::Medium => "medium",
            SyncPriority::Low => "low",
            SyncPriority::Background => "background",
        }
    }
}

/// Per-chat sync-state bookkeeping (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatSyncState {
    pub chat_id: String,
    pub chat_type: String,
    pub sync_priority: SyncPriority,
    pub sync_enabled: bool,
    pub forward_cursor: Option<i64>,
    pub backward_cursor: Option<i64>,
    pub history_complete: bool,
    pub synced_messages: i64,
    pub last_forward_sync: Option<i64>,
    pub last_backward_sync: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ChatSyncState {
    pub fn new(chat_id: impl Into<String>, chat_type: impl Into<String>, now: i64) -> Self {
        Self {
            chat_id: chat_id.into(),
            chat_type: chat_type.into(),
            sync_priority: SyncPriority::Medium,
            sync_enabled: true,
            forward_cursor: None,
            backward_cursor: None,
            history_complete: false,
            synced_messages: 0,
            last_forward_sync: None,
            last_backward_sync: None,
            created_at: now,
            updated_at: now,
        }
    }
}
