// src/cli/mod.rs
// Thin command layer (§6, §12): every handler reads/writes through the
// cache, accounts, or config services and renders one JSON envelope.
// Commands naming out-of-scope external collaborators (auth, send, api,
// skill) surface a typed "not available in this build" error rather
// than being silently stubbed, since the remote transport and
// authentication flow are not part of this core.

pub mod args;

use serde::Serialize;
use serde_json::json;

use crate::accounts::AccountsService;
use crate::cli::args::{AccountsAction, AuthAction, ChatsAction, Command, ConfigAction, ContactsAction, DaemonAction, MessagesAction, OutputFormat, SkillAction, SqlAction};
use crate::cache::{ChatCache, MessageCache, MessageSearchFilter, UserCache};
use crate::config::RuntimeConfig;
use crate::errors::{CoreError, CoreResult};
use crate::store::Store;

#[derive(Serialize)]
struct Envelope<T: Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorPayload>,
}

#[derive(Serialize)]
struct ErrorPayload {
    code: &'static str,
    message: String,
}

pub struct CliContext {
    pub config: RuntimeConfig,
    pub store: Store,
}

impl CliContext {
    pub async fn load() -> CoreResult<Self> {
        let config = RuntimeConfig::load()?;
        let store = Store::open(&config.data_dir).await.map_err(|e| CoreError::General(e.to_string()))?;
        Ok(Self { config, store })
    }
}

/// Renders a result as the `{success, data|error}` envelope and returns
/// the process exit code for it (§6 error contract / exit codes).
pub fn render<T: Serialize>(result: CoreResult<T>, format: OutputFormat) -> i32 {
    match result {
        Ok(data) => {
            let exit = 0;
            print_envelope(Envelope { success: true, data: Some(data), error: None }, format);
            exit
        }
        Err(e) => {
            let exit = e.exit_code();
            let payload: Envelope<()> =
                Envelope { success: false, data: None, error: Some(ErrorPayload { code: e.code(), message: e.to_string() }) };
            print_envelope(payload, format);
            exit
        }
    }
}

fn print_envelope<T: Serialize>(envelope: Envelope<T>, format: OutputFormat) {
    match format {
        OutputFormat::Quiet => {}
        OutputFormat::Json => println!("{}", serde_json::to_string(&envelope).unwrap_or_default()),
        OutputFormat::Pretty => println!("{}", serde_json::to_string_pretty(&envelope).unwrap_or_default()),
    }
}

/// A typed stand-in for a collaborator this core deliberately does not
/// implement (remote auth/transport). Surfaced, not silently ignored.
fn not_available(feature: &str) -> CoreError {
    CoreError::General(format!("{feature} is not available in this build (requires the remote transport)"))
}

pub async fn dispatch(command: Command, ctx: &CliContext) -> CoreResult<serde_json::Value> {
    match command {
        Command::Auth { action } => {
            let verb = match action {
                AuthAction::Login => "auth login",
                AuthAction::LoginQr => "auth login-qr",
                AuthAction::Logout => "auth logout",
                AuthAction::Status => "auth status",
            };
            Err(not_available(verb))
        }
        Command::Send { .. } => Err(not_available("send")),
        Command::Api { .. } => Err(not_available("api")),
        Command::Skill { action } => {
            let verb = match action {
                SkillAction::Manifest => "skill manifest",
                SkillAction::Validate => "skill validate",
                SkillAction::Install => "skill install",
            };
            Err(not_available(verb))
        }

        Command::Accounts { action } => accounts_command(action, ctx).await,
        Command::Chats { action } => chats_command(action, ctx).await,
        Command::Contacts { action } => contacts_command(action, ctx).await,
        Command::Messages { action } => messages_command(action, ctx).await,
        Command::User => user_command(ctx).await,
        Command::Sql { action } => sql_command(action).await,
        Command::Daemon { action } => daemon_command(action, ctx).await,
        Command::Status => status_command(ctx).await,
        Command::Config { action } => config_command(action, ctx).await,
    }
}

async fn accounts_command(action: AccountsAction, ctx: &CliContext) -> CoreResult<serde_json::Value> {
    let svc = AccountsService::new(ctx.store.accounts.clone());
    match action {
        AccountsAction::List => {
            let accounts = svc.list().await.map_err(|e| CoreError::General(e.to_string()))?;
            Ok(json!(accounts))
        }
        AccountsAction::SetActive { id } => {
            let ok = svc.set_active(id).await.map_err(|e| CoreError::General(e.to_string()))?;
            if !ok {
                return Err(CoreError::AccountNotFound(id.to_string()));
            }
            Ok(json!({ "id": id, "active": true }))
        }
        AccountsAction::Delete { id } => {
            let ok = svc.delete(id).await.map_err(|e| CoreError::General(e.to_string()))?;
            if !ok {
                return Err(CoreError::AccountNotFound(id.to_string()));
            }
            Ok(json!({ "id": id, "deleted": true }))
        }
    }
}

async fn chats_command(action: ChatsAction, ctx: &CliContext) -> CoreResult<serde_json::Value> {
    let svc = ChatCache::new(ctx.store.cache.clone());
    match action {
        ChatsAction::List { limit } => {
            let chats = svc.list(limit.unwrap_or(50), 0).await.map_err(|e| CoreError::General(e.to_string()))?;
            Ok(json!(chats))
        }
        ChatsAction::Search { query } => {
            let chats = svc.search(&query, 50).await.map_err(|e| CoreError::General(e.to_string()))?;
            Ok(json!(chats))
        }
        ChatsAction::Get { id } => {
            let chat = svc.get(&id).await.map_err(|e| CoreError::General(e.to_string()))?;
            Ok(json!(chat))
        }
    }
}

async fn contacts_command(action: ContactsAction, ctx: &CliContext) -> CoreResult<serde_json::Value> {
    let svc = UserCache::new(ctx.store.cache.clone());
    match action {
        ContactsAction::List => {
            let users = svc.list_contacts(200, 0).await.map_err(|e| CoreError::General(e.to_string()))?;
            Ok(json!(users))
        }
        ContactsAction::Search { query } => {
            let needle = query.to_ascii_lowercase();
            let users = svc.list_contacts(500, 0).await.map_err(|e| CoreError::General(e.to_string()))?;
            let matched: Vec<_> = users
                .into_iter()
                .filter(|u| {
                    u.username.as_deref().unwrap_or("").to_ascii_lowercase().contains(&needle)
                        || u.first_name.as_deref().unwrap_or("").to_ascii_lowercase().contains(&needle)
                        || u.last_name.as_deref().unwrap_or("").to_ascii_lowercase().contains(&needle)
                })
                .take(50)
                .collect();
            Ok(json!(matched))
        }
        ContactsAction::Get { id } => {
            let user = svc.get(&id).await.map_err(|e| CoreError::General(e.to_string()))?;
            Ok(json!(user))
        }
    }
}

async fn messages_command(action: MessagesAction, ctx: &CliContext) -> CoreResult<serde_json::Value> {
    let svc = MessageCache::new(ctx.store.cache.clone());
    match action {
        MessagesAction::Search { query, chat_id, include_deleted, limit } => {
            let filter = MessageSearchFilter { chat_id, include_deleted, ..Default::default() };
            let hits = svc.search(&query, &filter, limit).await.map_err(|e| CoreError::General(e.to_string()))?;
            Ok(json!(hits.into_iter().map(|h| h.message).collect::<Vec<_>>()))
        }
    }
}

async fn user_command(ctx: &CliContext) -> CoreResult<serde_json::Value> {
    let accounts = AccountsService::new(ctx.store.accounts.clone());
    let active = accounts.get_active().await.map_err(|e| CoreError::General(e.to_string()))?;
    match active {
        Some(account) => Ok(json!(account)),
        None => Err(CoreError::NoActiveAccount),
    }
}

async fn sql_command(action: SqlAction) -> CoreResult<serde_json::Value> {
    match action {
        SqlAction::PrintSchema => Ok(json!({
            "accounts": crate::store::schema::ACCOUNTS_SCHEMA,
            "cache": crate::store::schema::CACHE_SCHEMA,
        })),
    }
}

async fn daemon_command(action: DaemonAction, ctx: &CliContext) -> CoreResult<serde_json::Value> {
    match action {
        DaemonAction::Start => Err(CoreError::General(
            "use the telegram-sync-daemon binary to start the daemon process".to_string(),
        )),
        DaemonAction::Stop => {
            let pid_file = ctx.config.pid_file_path();
            crate::daemon::stop_daemon(&pid_file, std::time::Duration::from_secs(10)).await?;
            Ok(json!({ "stopped": true }))
        }
        DaemonAction::Status => {
            let pid_file = ctx.config.pid_file_path();
            let running = pid_file.exists();
            Ok(json!({ "running": running }))
        }
    }
}

async fn status_command(ctx: &CliContext) -> CoreResult<serde_json::Value> {
    let accounts = AccountsService::new(ctx.store.accounts.clone());
    let total = accounts.count().await.map_err(|e| CoreError::General(e.to_string()))?;
    let active = accounts.get_active().await.map_err(|e| CoreError::General(e.to_string()))?;
    let pid_file = ctx.config.pid_file_path();
    Ok(json!({
        "daemonRunning": pid_file.exists(),
        "totalAccounts": total,
        "activeAccount": active.map(|a| a.id),
    }))
}

async fn config_command(action: ConfigAction, ctx: &CliContext) -> CoreResult<serde_json::Value> {
    match action {
        ConfigAction::Path => Ok(json!({ "path": ctx.config.config_file_path() })),
        ConfigAction::Get { key } => {
            let value = config_get(&ctx.config.file, &key)?;
            Ok(json!({ "key": key, "value": value }))
        }
        ConfigAction::Set { key, value } => {
            let mut file = ctx.config.file.clone();
            config_set(&mut file, &key, &value)?;
            file.validate_strict()?;
            file.save(&ctx.config.config_file_path())?;
            Ok(json!({ "key": key, "value": value }))
        }
    }
}

fn config_get(file: &crate::config::FileConfig, key: &str) -> CoreResult<serde_json::Value> {
    match key {
        "activeAccount" => Ok(json!(file.active_account)),
        "cache.staleness.peers" => Ok(json!(file.cache.staleness.peers)),
        "cache.staleness.dialogs" => Ok(json!(file.cache.staleness.dialogs)),
        "cache.staleness.fullInfo" => Ok(json!(file.cache.staleness.full_info)),
        "cache.backgroundRefresh" => Ok(json!(file.cache.background_refresh)),
        "cache.maxCacheAge" => Ok(json!(file.cache.max_cache_age)),
        other => Err(CoreError::InvalidArgs(format!("unknown config key: {other}"))),
    }
}

fn config_set(file: &mut crate::config::FileConfig, key: &str, value: &str) -> CoreResult<()> {
    match key {
        "activeAccount" => {
            file.active_account =
                Some(value.parse().map_err(|_| CoreError::InvalidArgs(format!("not an integer: {value}")))?);
        }
        "cache.staleness.peers" => file.cache.staleness.peers = Some(value.to_string()),
        "cache.staleness.dialogs" => file.cache.staleness.dialogs = Some(value.to_string()),
        "cache.staleness.fullInfo" => file.cache.staleness.full_info = Some(value.to_string()),
        "cache.backgroundRefresh" => {
            file.cache.background_refresh =
                Some(value.parse().map_err(|_| CoreError::InvalidArgs(format!("not a bool: {value}")))?);
        }
        "cache.maxCacheAge" => file.cache.max_cache_age = Some(value.to_string()),
        other => return Err(CoreError::InvalidArgs(format!("unknown config key: {other}"))),
    }
    Ok(())
}
