//! Database Migrations
//!
//! Schema migration definitions for the graph store. The current schema
//! version lives in SQLite's `user_version` slot; a fresh store is created
//! at the latest version, an older store has the pending migrations applied
//! in order, one transaction per version.

use crate::error::{GraphError, Result};

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Base nodes and edges tables",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Merge metadata columns",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Timeline table",
        up: MIGRATION_V3_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Base schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    kind TEXT NOT NULL,
    summary TEXT NOT NULL,
    why TEXT,
    file_refs TEXT,
    parent_id TEXT REFERENCES nodes(id),
    created_by_task TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    removed_at TEXT,
    removed_reason TEXT,

    -- 384 little-endian float32s (1536 bytes); NULL when generation failed
    embedding BLOB
);

CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id);
CREATE INDEX IF NOT EXISTS idx_nodes_kind ON nodes(kind);
CREATE INDEX IF NOT EXISTS idx_nodes_removed ON nodes(removed_at);

CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_id TEXT NOT NULL REFERENCES nodes(id),
    to_id TEXT NOT NULL REFERENCES nodes(id),
    relation TEXT NOT NULL,
    description TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_edges_from ON edges(from_id);
CREATE INDEX IF NOT EXISTS idx_edges_to ON edges(to_id);
CREATE INDEX IF NOT EXISTS idx_edges_relation ON edges(relation);
"#;

/// V2: Merge metadata on both tables
const MIGRATION_V2_UP: &str = r#"
ALTER TABLE nodes ADD COLUMN merge_group TEXT;
ALTER TABLE nodes ADD COLUMN needs_merge INTEGER NOT NULL DEFAULT 0;
ALTER TABLE nodes ADD COLUMN source_branch TEXT;
ALTER TABLE nodes ADD COLUMN merge_timestamp TEXT;

ALTER TABLE edges ADD COLUMN merge_group TEXT;
ALTER TABLE edges ADD COLUMN needs_merge INTEGER NOT NULL DEFAULT 0;
ALTER TABLE edges ADD COLUMN source_branch TEXT;
ALTER TABLE edges ADD COLUMN merge_timestamp TEXT;

CREATE INDEX IF NOT EXISTS idx_nodes_merge_group ON nodes(merge_group);
CREATE INDEX IF NOT EXISTS idx_nodes_needs_merge ON nodes(needs_merge);
CREATE INDEX IF NOT EXISTS idx_edges_merge_group ON edges(merge_group);
"#;

/// V3: Append-only activity log
const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS timeline (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    tool TEXT NOT NULL,
    params TEXT NOT NULL,
    result_summary TEXT NOT NULL,
    is_write INTEGER NOT NULL,
    is_error INTEGER NOT NULL DEFAULT 0,
    affected_ids TEXT NOT NULL DEFAULT '[]'
);

CREATE INDEX IF NOT EXISTS idx_timeline_timestamp ON timeline(timestamp);
CREATE INDEX IF NOT EXISTS idx_timeline_is_write ON timeline(is_write);
"#;

/// Current schema version of a connection.
pub fn current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Apply pending migrations, returning how many ran.
pub fn apply_migrations(conn: &rusqlite::Connection) -> Result<u32> {
    let mut applied = 0;

    for migration in MIGRATIONS {
        let version = current_version(conn).map_err(GraphError::Database)?;
        if migration.version <= version {
            continue;
        }

        tracing::info!(
            "Applying migration v{}: {}",
            migration.version,
            migration.description
        );

        let run = || -> rusqlite::Result<()> {
            conn.execute_batch("BEGIN")?;
            conn.execute_batch(migration.up)?;
            conn.pragma_update(None, "user_version", migration.version)?;
            conn.execute_batch("COMMIT")?;
            Ok(())
        };

        if let Err(e) = run() {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(GraphError::SchemaMigration {
                version: migration.version,
                detail: e.to_string(),
            });
        }

        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn fresh_store_reaches_latest_version() {
        let conn = Connection::open_in_memory().unwrap();
        let applied = apply_migrations(&conn).unwrap();
        assert_eq!(applied, MIGRATIONS.len() as u32);
        assert_eq!(current_version(&conn).unwrap(), 3);
    }

    #[test]
    fn reapply_is_a_no_op() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        assert_eq!(apply_migrations(&conn).unwrap(), 0);
    }

    #[test]
    fn v1_store_upgrades_in_order() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(MIGRATIONS[0].up).unwrap();
        conn.pragma_update(None, "user_version", 1).unwrap();

        let applied = apply_migrations(&conn).unwrap();
        assert_eq!(applied, 2);
        assert_eq!(current_version(&conn).unwrap(), 3);

        // Merge columns from v2 must exist afterwards
        conn.execute(
            "INSERT INTO nodes (id, name, kind, summary, created_at, updated_at, needs_merge)
             VALUES ('a', 'A', 'module', 's', '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z', 1)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn versions_are_strictly_increasing() {
        let mut last = 0;
        for migration in MIGRATIONS {
            assert!(migration.version > last);
            last = migration.version;
        }
    }
}
