// src/remote/mod.rs
// The abstract remote client the sync worker consumes (§4.4, §13). The
// concrete transport (network protocol, auth) is an external collaborator;
// this module only defines the seam it plugs into, grounded in the
// teacher's pattern of a trait-bounded provider with a graceful no-op
// fallback (`llm::provider` / `SemanticSearch::new` degrading when a
// dependency is absent).

use async_trait::async_trait;

use crate::models::RawMessage;

/// Parameters for `get_messages`, mirroring §4.4's job-type call shapes.
#[derive(Debug, Clone, Default)]
pub struct GetMessagesParams {
    pub limit: i64,
    pub offset_id: Option<i64>,
    pub add_offset: Option<i64>,
    pub min_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct GetMessagesResult {
    pub messages: Vec<RawMessage>,
    pub no_more_messages: bool,
}

/// A remote-imposed temporary block, raised by the transport when a call
/// is throttled (§4.6, §4.4 "flood-wait translation").
#[derive(Debug, Clone, thiserror::Error)]
#[error("flood wait on {method}: {seconds}s")]
pub struct FloodWaitError {
    pub method: String,
    pub seconds: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error(transparent)]
    FloodWait(#[from] FloodWaitError),
    #[error("remote API error: {0}")]
    Api(String),
    #[error("network error: {0}")]
    Network(String),
}

/// The one method the sync worker needs from a remote transport (§4.4).
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn get_messages(
        &self,
        chat_id: &str,
        params: GetMessagesParams,
    ) -> Result<GetMessagesResult, RemoteError>;
}

/// Always returns an empty, exhausted batch. Used for tests and for
/// running the daemon with no transport configured, so the rest of the
/// sync pipeline has something to call against instead of an `Option`
/// threaded through every layer.
pub struct NullRemoteClient;

#[async_trait]
impl RemoteClient for NullRemoteClient {
    async fn get_messages(
        &self,
        _chat_id: &str,
        _params: GetMessagesParams,
    ) -> Result<GetMessagesResult, RemoteError> {
        Ok(GetMessagesResult { messages: Vec::new(), no_more_messages: true })
    }
}
