// src/sync/updates.rs
// Live update handlers (§4.7): apply new/edit/delete/batch events to the
// message cache and cursors, idempotently. Every handler here is called
// from a per-account event consumer task (§5); a failure must never
// abort that task, so callers should route through `apply` rather than
// calling the per-kind methods directly when processing a live stream.

use std::collections::HashMap;

use anyhow::Result;
use tracing::warn;

use crate::cache::MessageCache;
use crate::models::{Message, RawMessage};
use crate::sync::state::ChatSyncStateService;

pub struct UpdateHandlers {
    state: ChatSyncStateService,
    messages: MessageCache,
}

/// One live event, tagged by kind. `Delete` carries an optional chat id -
/// when absent, every matching message id across all chats is tombstoned.
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    NewMessage(RawMessage),
    Edit { chat_id: String, message_id: i64, text: Option<String>, edit_date: i64 },
    Delete { chat_id: Option<String>, message_ids: Vec<i64> },
    Batch(Vec<RawMessage>),
}

impl UpdateHandlers {
    pub fn new(state: ChatSyncStateService, messages: MessageCache) -> Self {
        Self { state, messages }
    }

    /// Applies one event, logging and swallowing any failure so the
    /// enclosing event stream keeps running.
    pub async fn apply(&self, event: UpdateEvent) {
        let result = match &event {
            UpdateEvent::NewMessage(raw) => self.handle_new_message(raw).await,
            UpdateEvent::Edit { chat_id, message_id, text, edit_date } => {
                self.handle_edit(chat_id, *message_id, text.clone(), *edit_date).await
            }
            UpdateEvent::Delete { chat_id: Some(chat_id), message_ids } => {
                self.handle_delete_with_chat(chat_id, message_ids).await.map(|_| ())
            }
            UpdateEvent::Delete { chat_id: None, message_ids } => {
                self.handle_delete_without_chat(message_ids).await.map(|_| ())
            }
            UpdateEvent::Batch(raws) => self.handle_batch(raws).await,
        };

        if let Err(e) = result {
            warn!(error = %e, context = %event_context(&event), "update handler failed, event dropped");
        }
    }

    /// Ensures a sync-state row exists (default private/enabled/Medium),
    /// upserts the message, advances `forward_cursor` iff improved,
    /// increments the synced counter, and stamps `last_forward_sync`.
    async fn handle_new_message(&self, raw: &RawMessage) -> Result<()> {
        let chat_id = raw.chat_id.clone();
        self.state.get_or_create(&chat_id, "private").await?;

        let message = raw.clone().into_message(crate::store::now());
        let id = message.message_id;
        self.messages.upsert(&message).await?;

        self.state.update_cursors(&chat_id, Some(id), None).await?;
        self.state.increment_synced_messages(&chat_id, 1).await?;
        self.state.update_last_sync(&chat_id, crate::sync::state::SyncDirection::Forward).await?;
        Ok(())
    }

    async fn handle_edit(&self, chat_id: &str, message_id: i64, text: Option<String>, edit_date: i64) -> Result<()> {
        self.messages.update_text(chat_id, message_id, text.as_deref().unwrap_or(""), edit_date).await?;
        Ok(())
    }

    async fn handle_delete_with_chat(&self, chat_id: &str, message_ids: &[i64]) -> Result<u64> {
        self.messages.mark_deleted(chat_id, message_ids).await
    }

    /// No chat context accompanies the event (small/private-chat delete
    /// payloads from some transports omit it); tombstones every matching
    /// row across all chats.
    async fn handle_delete_without_chat(&self, message_ids: &[i64]) -> Result<u64> {
        self.messages.mark_deleted_by_message_ids(message_ids).await
    }

    /// Groups by chat, upserts each group in one transaction, then
    /// advances that chat's cursors atomically (CAS-style, so this never
    /// regresses a cursor already moved further by a concurrent live
    /// event or catchup job).
    async fn handle_batch(&self, raws: &[RawMessage]) -> Result<()> {
        let mut by_chat: HashMap<String, Vec<Message>> = HashMap::new();
        for raw in raws {
            let message = raw.clone().into_message(crate::store::now());
            by_chat.entry(message.chat_id.clone()).or_default().push(message);
        }

        for (chat_id, messages) in by_chat {
            self.state.get_or_create(&chat_id, "private").await?;
            self.messages.upsert_batch(&messages).await?;

            let max_id = messages.iter().map(|m| m.message_id).max();
            let min_id = messages.iter().map(|m| m.message_id).min();
            self.state.update_cursors(&chat_id, max_id, min_id).await?;
        }
        Ok(())
    }
}

/// Compact diagnostic context for a failed event: chat id and up to 5
/// message ids, per §4.7.
fn event_context(event: &UpdateEvent) -> String {
    match event {
        UpdateEvent::NewMessage(raw) => format!("chat={} id={}", raw.chat_id, raw.id),
        UpdateEvent::Edit { chat_id, message_id, .. } => format!("chat={chat_id} id={message_id}"),
        UpdateEvent::Delete { chat_id, message_ids } => {
            let ids = truncated_ids(message_ids);
            match chat_id {
                Some(c) => format!("chat={c} ids={ids}"),
                None => format!("chat=<none> ids={ids}"),
            }
        }
        UpdateEvent::Batch(raws) => {
            let ids: Vec<i64> = raws.iter().take(5).map(|r| r.id).collect();
            format!("batch of {} ids={:?}", raws.len(), ids)
        }
    }
}

fn truncated_ids(ids: &[i64]) -> String {
    format!("{:?}", ids.iter().take(5).collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;

    fn raw(chat_id: &str, id: i64) -> RawMessage {
        RawMessage {
            id,
            chat_id: chat_id.to_string(),
            sender_id: None,
            text: Some("hi".to_string()),
            message_type: None,
            has_media: false,
            reply_to_id: None,
            forward_from_id: None,
            is_outgoing: false,
            date: 1000,
            raw_payload: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn new_message_advances_forward_cursor_only_when_improved() {
        let store = Store::open_in_memory().await.unwrap();
        let handlers = UpdateHandlers::new(
            ChatSyncStateService::new(store.cache.clone()),
            MessageCache::new(store.cache.clone()),
        );

        handlers.apply(UpdateEvent::NewMessage(raw("100", 50))).await;
        handlers.apply(UpdateEvent::NewMessage(raw("100", 10))).await; // stale, out of order

        let state = ChatSyncStateService::new(store.cache.clone()).get("100").await.unwrap().unwrap();
        assert_eq!(state.forward_cursor, Some(50));
        assert_eq!(state.synced_messages, 2);
    }

    #[tokio::test]
    async fn delete_without_chat_tombstones_across_chats() {
        let store = Store::open_in_memory().await.unwrap();
        let messages = MessageCache::new(store.cache.clone());
        let handlers = UpdateHandlers::new(ChatSyncStateService::new(store.cache.clone()), MessageCache::new(store.cache.clone()));

        messages.upsert(&raw("100", 5).into_message(1000)).await.unwrap();
        messages.upsert(&raw("200", 5).into_message(1000)).await.unwrap();

        handlers.apply(UpdateEvent::Delete { chat_id: None, message_ids: vec![5] }).await;

        assert!(messages.get("100", 5).await.unwrap().unwrap().is_deleted);
        assert!(messages.get("200", 5).await.unwrap().unwrap().is_deleted);
    }

    #[tokio::test]
    async fn edit_updates_text_without_touching_cursor() {
        let store = Store::open_in_memory().await.unwrap();
        let messages = MessageCache::new(store.cache.clone());
        let state = ChatSyncStateService::new(store.cache.clone());
        let handlers = UpdateHandlers::new(ChatSyncStateService::new(store.cache.clone()), MessageCache::new(store.cache.clone()));

        messages.upsert(&raw("100", 5).into_message(1000)).await.unwrap();
        state.get_or_create("100", "private").await.unwrap();
        state.update_cursors("100", Some(5), None).await.unwrap();

        handlers.apply(UpdateEvent::Edit { chat_id: "100".to_string(), message_id: 5, text: Some("edited".to_string()), edit_date: 2000 }).await;

        let message = messages.get("100", 5).await.unwrap().unwrap();
        assert_eq!(message.text.as_deref(), Some("edited"));
        assert!(message.is_edited);

        let state_after = state.get("100").await.unwrap().unwrap();
        assert_eq!(state_after.forward_cursor, Some(5));
    }
}
