// src/cache/mod.rs
// Typed CRUD façades over the cache store (§4.1). Each service prepares
// no statements ahead of time beyond what sqlx itself caches per unique
// SQL string on the pool, but every call site writes out full SQL so the
// shape of each query is visible where it is used - the style the teacher
// uses throughout `project/tasks/store.rs` and `cache/session_state_store.rs`.

pub mod chats;
pub mod messages;
pub mod users;

pub use chats::ChatCache;
pub use messages::{MessageCache, MessageFilter, MessageSearchFilter};
pub use users::UserCache;
