// src/models/message.rs

use serde::{Deserialize, Serialize};

/// A cached message (§3.1). Composite key `(chat_id, message_id)`.
/// Deletion is a tombstone: `is_deleted=1`, row retained.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub chat_id: String,
    pub message_id: i64,
    pub sender_id: Option<String>,
    pub text: Option<String>,
    pub message_type: String,
    pub has_media: bool,
    pub reply_to_id: Option<i64>,
    pub forward_from_id: Option<String>,
    pub is_outgoing: bool,
    pub is_edited: bool,
    pub is_pinned: bool,
    pub is_deleted: bool,
    pub date: i64,
    pub edit_date: Option<i64>,
    pub fetched_at: i64,
    pub raw_payload: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Message {
    pub fn new_incoming(chat_id: impl Into<String>, message_id: i64, date: i64) -> Self {
        Self {
            chat_id: chat_id.into(),
            message_id,
            sender_id: None,
            text: None,
            message_type: "text".to_string(),
            has_media: false,
            reply_to_id: None,
            forward_from_id: None,
            is_outgoing: false,
            is_edited: false,
            is_pinned: false,
            is_deleted: false,
            date,
            edit_date: None,
            fetched_at: date,
            raw_payload: None,
            created_at: date,
            updated_at: date,
        }
    }
}

/// A raw batch member as returned by the remote client, prior to the typed
/// projection extracted at ingest (§9 Design Notes: "Cyclic and dynamic
/// types").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: i64,
    pub chat_id: String,
    pub sender_id: Option<String>,
    pub text: Option<String>,
    pub message_type: Option<String>,
    pub has_media: bool,
    pub reply_to_id: Option<i64>,
    pub forward_from_id: Option<String>,
    pub is_outgoing: bool,
    pub date: i64,
    pub raw_payload: serde_json::Value,
}

impl RawMessage {
    /// Extracts the typed cache row from a raw remote payload.
    pub fn into_message(self, fetched_at: i64) -> Message {
        Message {
            chat_id: self.chat_id,
            message_id: self.id,
            sender_id: self.sender_id,
            text: self.text,
            message_type: self.message_type.unwrap_or_else(|| "text".to_string()),
            has_media: self.has_media,
            reply_to_id: self.reply_to_id,
            forward_from_id: self.forward_from_id,
            is_outgoing: self.is_outgoing,
            is_edited: false,
            is_pinned: false,
            is_deleted: false,
            date: self.date,
            edit_date: None,
            fetched_at,
            raw_payload: Some(self.raw_payload.to_string()),
            created_at: fetched_at,
            updated_at: fetched_at,
        }
    }
}
