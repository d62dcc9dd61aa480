// src/errors.rs
// Error taxonomy shared by the sync core and the CLI surface.

use thiserror::Error;

/// The taxonomy codes from the CLI error contract. Every CLI-visible error
/// maps to exactly one of these; the exit code table lives in `cli::exit_code`.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{0}")]
    General(String),

    #[error("authentication required: {0}")]
    AuthRequired(String),

    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("remote API error: {0}")]
    RemoteApi(String),

    #[error("rate limited: wait {wait_seconds}s")]
    RateLimited { wait_seconds: i64 },

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("no active account")]
    NoActiveAccount,

    #[error("session password needed")]
    SessionPasswordNeeded,

    #[error("daemon is not running")]
    DaemonNotRunning,

    #[error("daemon is already running (pid {0})")]
    DaemonAlreadyRunning(u32),

    #[error("failed to signal daemon: {0}")]
    DaemonSignalFailed(String),

    #[error("daemon did not shut down within the timeout")]
    DaemonShutdownTimeout,

    #[error("failed to force-kill daemon: {0}")]
    DaemonForceKillFailed(String),

    #[error("SQL writes are not allowed through this interface")]
    SqlWriteNotAllowed,

    #[error("SQL syntax error: {0}")]
    SqlSyntaxError(String),

    #[error("table not found: {0}")]
    SqlTableNotFound(String),

    #[error("SQL operation blocked: {0}")]
    SqlOperationBlocked(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl CoreError {
    /// Exit code per spec.md §6: 0 success; 1 general; 2 auth required;
    /// 3 invalid args; 4 network; 5 remote API / rate-limit; 6 account not found.
    pub fn exit_code(&self) -> i32 {
        match self {
            CoreError::AuthRequired(_)
            | CoreError::NoActiveAccount
            | CoreError::SessionPasswordNeeded => 2,
            CoreError::InvalidArgs(_) => 3,
            CoreError::Network(_) => 4,
            CoreError::RemoteApi(_) | CoreError::RateLimited { .. } => 5,
            CoreError::AccountNotFound(_) => 6,
            _ => 1,
        }
    }

    /// The string code used in `{success:false,error:{code,...}}` payloads.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::General(_) => "GENERAL",
            CoreError::AuthRequired(_) => "AUTH_REQUIRED",
            CoreError::InvalidArgs(_) => "INVALID_ARGS",
            CoreError::Network(_) => "NETWORK",
            CoreError::RemoteApi(_) => "REMOTE_API",
            CoreError::RateLimited { .. } => "RATE_LIMITED",
            CoreError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            CoreError::NoActiveAccount => "NO_ACTIVE_ACCOUNT",
            CoreError::SessionPasswordNeeded => "SESSION_PASSWORD_NEEDED",
            CoreError::DaemonNotRunning => "DAEMON_NOT_RUNNING",
            CoreError::DaemonAlreadyRunning(_) => "DAEMON_ALREADY_RUNNING",
            CoreError::DaemonSignalFailed(_) => "DAEMON_SIGNAL_FAILED",
            CoreError::DaemonShutdownTimeout => "DAEMON_SHUTDOWN_TIMEOUT",
            CoreError::DaemonForceKillFailed(_) => "DAEMON_FORCE_KILL_FAILED",
            CoreError::SqlWriteNotAllowed => "SQL_WRITE_NOT_ALLOWED",
            CoreError::SqlSyntaxError(_) => "SQL_SYNTAX_ERROR",
            CoreError::SqlTableNotFound(_) => "SQL_TABLE_NOT_FOUND",
            CoreError::SqlOperationBlocked(_) => "SQL_OPERATION_BLOCKED",
            CoreError::Other(_) | CoreError::Sqlx(_) => "GENERAL",
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
