// src/store/schema.rs
// Schema creation, run once per pool at `Store::open`. Idempotent:
// every statement is `CREATE TABLE IF NOT EXISTS` / `CREATE INDEX IF NOT EXISTS`.

/// Schema for `accounts.db`.
pub const ACCOUNTS_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    phone           TEXT NOT NULL,
    display_name    TEXT,
    username        TEXT,
    label           TEXT,
    session_blob    BLOB,
    is_active       INTEGER NOT NULL DEFAULT 0,
    created_at      INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_phone ON accounts(phone);
"#;

/// Schema for `cache.db`: users, chats, messages (+ FTS), sync state,
/// sync jobs, rate limits, daemon status.
pub const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id              TEXT PRIMARY KEY,
    username        TEXT,
    first_name      TEXT,
    last_name       TEXT,
    phone           TEXT,
    access_token    TEXT,
    is_contact      INTEGER NOT NULL DEFAULT 0,
    is_bot          INTEGER NOT NULL DEFAULT 0,
    is_premium      INTEGER NOT NULL DEFAULT 0,
    fetched_at      INTEGER NOT NULL,
    raw_payload     TEXT,
    created_at      INTEGER NOT NULL,
    updated_at      INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_users_username ON users(username);
CREATE INDEX IF NOT EXISTS idx_users_phone ON users(phone);

CREATE TABLE IF NOT EXISTS chats (
    id               TEXT PRIMARY KEY,
    chat_type        TEXT NOT NULL,
    title            TEXT,
    username         TEXT,
    member_count     INTEGER,
    access_token     TEXT,
    is_creator       INTEGER NOT NULL DEFAULT 0,
    is_admin         INTEGER NOT NULL DEFAULT 0,
    last_message_id  INTEGER,
    last_message_at  INTEGER,
    fetched_at       INTEGER NOT NULL,
    created_at       INTEGER NOT NULL,
    updated_at       INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chats_username ON chats(username);

CREATE TABLE IF NOT EXISTS messages (
    chat_id          TEXT NOT NULL,
    message_id       INTEGER NOT NULL,
    sender_id        TEXT,
    text             TEXT,
    message_type     TEXT NOT NULL DEFAULT 'text',
    has_media        INTEGER NOT NULL DEFAULT 0,
    reply_to_id      INTEGER,
    forward_from_id  TEXT,
    is_outgoing      INTEGER NOT NULL DEFAULT 0,
    is_edited        INTEGER NOT NULL DEFAULT 0,
    is_pinned        INTEGER NOT NULL DEFAULT 0,
    is_deleted       INTEGER NOT NULL DEFAULT 0,
    date             INTEGER NOT NULL,
    edit_date        INTEGER,
    fetched_at       INTEGER NOT NULL,
    raw_payload      TEXT,
    created_at       INTEGER NOT NULL,
    updated_at       INTEGER NOT NULL,
    PRIMARY KEY (chat_id, message_id)
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_date ON messages(chat_id, date DESC);
CREATE INDEX IF NOT EXISTS idx_messages_sender ON messages(sender_id);

CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
    chat_id UNINDEXED,
    message_id UNINDEXED,
    text
);

CREATE TABLE IF NOT EXISTS chat_sync_state (
    chat_id             TEXT PRIMARY KEY,
    chat_type           TEXT NOT NULL,
    sync_priority       INTEGER NOT NULL DEFAULT 2,
    sync_enabled        INTEGER NOT NULL DEFAULT 1,
    forward_cursor      INTEGER,
    backward_cursor     INTEGER,
    history_complete    INTEGER NOT NULL DEFAULT 0,
    synced_messages     INTEGER NOT NULL DEFAULT 0,
    last_forward_sync   INTEGER,
    last_backward_sync  INTEGER,
    created_at          INTEGER NOT NULL,
    updated_at          INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sync_state_enabled ON chat_sync_state(sync_enabled);
CREATE INDEX IF NOT EXISTS idx_sync_state_priority ON chat_sync_state(sync_priority);

CREATE TABLE IF NOT EXISTS sync_jobs (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    chat_id           TEXT NOT NULL,
    job_type          TEXT NOT NULL,
    priority          INTEGER NOT NULL,
    status            TEXT NOT NULL DEFAULT 'Pending',
    cursor_start      INTEGER,
    cursor_end        INTEGER,
    messages_fetched  INTEGER NOT NULL DEFAULT 0,
    error_message     TEXT,
    created_at        INTEGER NOT NULL,
    started_at        INTEGER,
    completed_at      INTEGER
);

CREATE INDEX IF NOT EXISTS idx_sync_jobs_status_priority ON sync_jobs(status, priority, created_at);
CREATE INDEX IF NOT EXISTS idx_sync_jobs_chat_type ON sync_jobs(chat_id, job_type);

CREATE TABLE IF NOT EXISTS rate_limit_calls (
    method      TEXT NOT NULL,
    called_at   INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_rate_limit_calls_method_time ON rate_limit_calls(method, called_at);

CREATE TABLE IF NOT EXISTS rate_limit_blocks (
    method         TEXT PRIMARY KEY,
    blocked_until  INTEGER NOT NULL,
    wait_seconds   INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS daemon_status (
    id                   INTEGER PRIMARY KEY CHECK (id = 1),
    started_at           INTEGER NOT NULL,
    last_update          INTEGER NOT NULL,
    connected_accounts   INTEGER NOT NULL DEFAULT 0,
    total_accounts       INTEGER NOT NULL DEFAULT 0,
    messages_synced      INTEGER NOT NULL DEFAULT 0
);
"#;
