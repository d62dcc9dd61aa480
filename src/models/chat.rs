// src/models/chat.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Private,
    Group,
    Supergroup,
    Channel,
}

impl ChatType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatType::Private => "private",
            ChatType::Group => "group",
            ChatType::Supergroup => "supergroup",
            ChatType::Channel => "channel",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(ChatType::Private),
            "group" => Some(ChatType::Group),
            "supergroup" => Some(ChatType::Supergroup),
            "channel" => Some(ChatType::Channel),
            _ => None,
        }
    }
}

/// A cached dialog (§3.1).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chat {
    pub id: String,
    pub chat_type: ChatType,
    pub title: Option<String>,
    pub username: Option<String>,
    pub member_count: Option<i64>,
    pub access_token: Option<String>,
    pub is_creator: bool,
    pub is_admin: bool,
    pub last_message_id: Option<i64>,
    pub last_message_at: Option<i64>,
    pub fetched_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}
