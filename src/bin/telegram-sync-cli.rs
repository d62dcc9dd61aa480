// src/bin/telegram-sync-cli.rs
// CLI entrypoint: parses args, loads the store, dispatches one command,
// prints the envelope, exits with the taxonomy's exit code.

use clap::Parser;
use telegram_sync_core::cli::args::CliArgs;
use telegram_sync_core::cli::{dispatch, render, CliContext};

#[tokio::main]
async fn main() {
    let filter = if std::env::var("VERBOSE").map(|v| v == "1").unwrap_or(false) {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(filter).unwrap())
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let exit_code = match CliContext::load().await {
        Ok(ctx) => {
            let result = dispatch(args.command, &ctx).await;
            render(result, args.format)
        }
        Err(e) => render::<()>(Err(e), args.format),
    };

    std::process::exit(exit_code);
}
