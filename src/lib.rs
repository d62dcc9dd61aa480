// src/lib.rs
// The sync core as a library: every binary (`telegram-sync-cli`,
// `telegram-sync-daemon`) is a thin entrypoint over these modules.

pub mod accounts;
pub mod cache;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod errors;
pub mod models;
pub mod remote;
pub mod store;
pub mod sync;
