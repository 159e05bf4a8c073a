//! bulletin - a terminal news reader that shows cached headlines at once while
//! a background loader refreshes them.
//!
//! The foreground side (`controller`, `session`, `coordinator`, `reporter`)
//! talks to the background `loader` only through the message types in
//! `protocol`, carried by `channel`. Both sides share the SQLite `storage`.

pub mod channel;
pub mod config;
pub mod controller;
pub mod coordinator;
pub mod loader;
pub mod preferences;
pub mod protocol;
pub mod reporter;
pub mod session;
pub mod storage;
pub mod ui;
pub mod util;
