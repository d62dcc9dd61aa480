// src/cli/args.rs
// CLI argument definitions (§6, §12), clap derive in the teacher's style
// (`cli::args::CliArgs`) but subcommand-shaped since this surface is a
// verb set rather than a single free-form prompt.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "telegram-sync-cli")]
#[command(version)]
#[command(about = "Local-first cache and sync control for a messaging account", long_about = None)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Output format
    #[arg(long, global = true, default_value = "pretty")]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Pretty,
    Json,
    Quiet,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Authentication flows (out of scope for this build)
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Manage cached accounts
    Accounts {
        #[command(subcommand)]
        action: AccountsAction,
    },
    /// Query cached chats
    Chats {
        #[command(subcommand)]
        action: ChatsAction,
    },
    /// Query cached contacts (users marked as contacts)
    Contacts {
        #[command(subcommand)]
        action: ContactsAction,
    },
    /// Search cached messages
    Messages {
        #[command(subcommand)]
        action: MessagesAction,
    },
    /// Show the active account's cached profile
    User,
    /// Send a message (out of scope for this build)
    Send { chat_id: String, text: String },
    /// Read-only SQL access to the cache store
    Sql {
        #[command(subcommand)]
        action: SqlAction,
    },
    /// Control the background sync daemon
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
    /// Combined daemon + sync status snapshot
    Status,
    /// Read/write `config.json`
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// AI-agent manifest commands (out of scope for this build)
    Skill {
        #[command(subcommand)]
        action: SkillAction,
    },
    /// Raw passthrough to the remote API (out of scope for this build)
    Api { method: String, #[arg(long)] json: Option<String> },
}

#[derive(Subcommand, Debug)]
pub enum AuthAction {
    Login,
    LoginQr,
    Logout,
    Status,
}

#[derive(Subcommand, Debug)]
pub enum AccountsAction {
    List,
    SetActive { id: i64 },
    Delete { id: i64 },
}

#[derive(Subcommand, Debug)]
pub enum ChatsAction {
    List { #[arg(long)] limit: Option<i64> },
    Search { query: String },
    Get { id: String },
}

#[derive(Subcommand, Debug)]
pub enum ContactsAction {
    List,
    Search { query: String },
    Get { id: String },
}

#[derive(Subcommand, Debug)]
pub enum MessagesAction {
    Search {
        query: String,
        #[arg(long)]
        chat_id: Option<String>,
        #[arg(long)]
        include_deleted: bool,
        #[arg(long, default_value = "50")]
        limit: i64,
    },
}

#[derive(Subcommand, Debug)]
pub enum SqlAction {
    PrintSchema,
}

#[derive(Subcommand, Debug)]
pub enum DaemonAction {
    Start,
    Stop,
    Status,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    Get { key: String },
    Set { key: String, value: String },
    Path,
}

#[derive(Subcommand, Debug)]
pub enum SkillAction {
    Manifest,
    Validate,
    Install,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_accounts_list() {
        let args = CliArgs::parse_from(["telegram-sync-cli", "accounts", "list"]);
        assert!(matches!(args.command, Command::Accounts { action: AccountsAction::List }));
    }

    #[test]
    fn parses_messages_search_with_flags() {
        let args = CliArgs::parse_from([
            "telegram-sync-cli",
            "messages",
            "search",
            "hello",
            "--chat-id",
            "100",
            "--include-deleted",
        ]);
        match args.command {
            Command::Messages { action: MessagesAction::Search { query, chat_id, include_deleted, .. } } => {
                assert_eq!(query, "hello");
                assert_eq!(chat_id.as_deref(), Some("100"));
                assert!(include_deleted);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn format_defaults_to_pretty() {
        let args = CliArgs::parse_from(["telegram-sync-cli", "status"]);
        assert_eq!(args.format, OutputFormat::Pretty);
    }
}
