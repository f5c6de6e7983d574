//! Persistent Graph Store
//!
//! SQLite-backed storage for nodes, edges, and the timeline:
//! - WAL journaling with foreign-key enforcement
//! - soft deletion with edge/child cascades
//! - schema migrations stamped in the `user_version` slot
//! - time-travel reconstruction queries

mod migrations;
mod sqlite;
mod timeline;

pub use migrations::{Migration, MIGRATIONS};
pub use sqlite::{GraphStore, DB_PATH_ENV, DEFAULT_DB_DIR, DEFAULT_DB_FILE};

pub(crate) use sqlite::now_secs;
