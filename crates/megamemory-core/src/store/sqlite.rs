//! SQLite Graph Store Implementation
//!
//! Single-writer store with separate reader/writer connections. All methods
//! take `&self`; the writer connection is serialized behind a mutex so the
//! store is `Send + Sync` and the tool layer can share it as `Arc<GraphStore>`.

use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::embeddings::{embedding_from_bytes, embedding_to_bytes};
use crate::error::{GraphError, Result};
use crate::graph::{
    ConceptKind, ConceptNode, ConceptPatch, EdgeRecord, EdgeWithNeighbor, GraphStats, NewConcept,
    NewEdge, Relation,
};

use super::migrations;

// ============================================================================
// PATH CONVENTIONS
// ============================================================================

/// Directory holding the per-project store, relative to the working directory.
pub const DEFAULT_DB_DIR: &str = ".megamemory";

/// Store file name inside [`DEFAULT_DB_DIR`].
pub const DEFAULT_DB_FILE: &str = "knowledge.db";

/// Environment variable overriding the store location for every entry point.
pub const DB_PATH_ENV: &str = "MEGAMEMORY_DB_PATH";

/// Resolve the store path: explicit > `MEGAMEMORY_DB_PATH` > conventional
/// location under the working directory.
pub(crate) fn resolve_db_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    PathBuf::from(DEFAULT_DB_DIR).join(DEFAULT_DB_FILE)
}

// ============================================================================
// TIMESTAMP HELPERS
// ============================================================================

/// Persisted timestamp format: RFC 3339 UTC at second resolution. The `Z`
/// suffix keeps strings lexicographically ordered, so SQL string comparison
/// is time comparison.
pub(crate) fn fmt_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Current time truncated to the stored resolution.
pub(crate) fn now_secs() -> DateTime<Utc> {
    let now = Utc::now();
    now.with_nanosecond(0).unwrap_or(now)
}

fn parse_ts(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            GraphError::InvariantViolation(format!("bad {} timestamp '{}': {}", field, value, e))
        })
}

fn parse_ts_opt(value: Option<String>, field: &str) -> Result<Option<DateTime<Utc>>> {
    value.map(|s| parse_ts(&s, field)).transpose()
}

// ============================================================================
// RAW ROW SHAPES
// ============================================================================

/// Node row as read from SQLite, before typed conversion.
struct RawNode {
    id: String,
    name: String,
    kind: String,
    summary: String,
    why: Option<String>,
    file_refs: Option<String>,
    parent_id: Option<String>,
    created_by_task: Option<String>,
    created_at: String,
    updated_at: String,
    removed_at: Option<String>,
    removed_reason: Option<String>,
    embedding: Option<Vec<u8>>,
    merge_group: Option<String>,
    needs_merge: bool,
    source_branch: Option<String>,
    merge_timestamp: Option<String>,
}

struct RawEdge {
    id: i64,
    from_id: String,
    to_id: String,
    relation: String,
    description: Option<String>,
    created_at: String,
    merge_group: Option<String>,
    needs_merge: bool,
    source_branch: Option<String>,
    merge_timestamp: Option<String>,
}

// ============================================================================
// GRAPH STORE
// ============================================================================

/// SQLite-backed graph store.
pub struct GraphStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    path: PathBuf,
}

impl GraphStore {
    /// Apply PRAGMAs shared by both connections.
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;",
        )?;
        Ok(())
    }

    /// Open (creating if absent) the store at `db_path`, or at the resolved
    /// conventional location when `None`. Applies pending migrations.
    pub fn open(db_path: Option<PathBuf>) -> Result<Self> {
        let path = resolve_db_path(db_path);
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        let writer_conn = Connection::open(&path)?;
        Self::configure_connection(&writer_conn)?;
        migrations::apply_migrations(&writer_conn)?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            path,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current schema version from the `user_version` slot.
    pub fn schema_version(&self) -> Result<u32> {
        let reader = self.reader()?;
        migrations::current_version(&reader).map_err(GraphError::Database)
    }

    pub(crate) fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| GraphError::InvariantViolation("writer lock poisoned".to_string()))
    }

    pub(crate) fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| GraphError::InvariantViolation("reader lock poisoned".to_string()))
    }

    /// Toggle foreign-key enforcement on the writer connection. Used by the
    /// merge import (nodes arrive in arbitrary order) and by id renames; the
    /// single-writer discipline means no other writer can interleave.
    pub(crate) fn set_foreign_keys(&self, on: bool) -> Result<()> {
        let writer = self.writer()?;
        writer.pragma_update(None, "foreign_keys", on)?;
        Ok(())
    }

    // ========================================================================
    // ROW MAPPING
    // ========================================================================

    fn raw_node(row: &rusqlite::Row) -> rusqlite::Result<RawNode> {
        Ok(RawNode {
            id: row.get("id")?,
            name: row.get("name")?,
            kind: row.get("kind")?,
            summary: row.get("summary")?,
            why: row.get("why")?,
            file_refs: row.get("file_refs")?,
            parent_id: row.get("parent_id")?,
            created_by_task: row.get("created_by_task")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
            removed_at: row.get("removed_at")?,
            removed_reason: row.get("removed_reason")?,
            embedding: row.get("embedding")?,
            merge_group: row.get("merge_group")?,
            needs_merge: row.get("needs_merge")?,
            source_branch: row.get("source_branch")?,
            merge_timestamp: row.get("merge_timestamp")?,
        })
    }

    fn node_from_raw(raw: RawNode) -> Result<ConceptNode> {
        let kind = ConceptKind::parse(&raw.kind).ok_or_else(|| {
            GraphError::InvariantViolation(format!(
                "unknown concept kind '{}' on node {}",
                raw.kind, raw.id
            ))
        })?;

        let file_refs: Vec<String> = match raw.file_refs.as_deref() {
            None | Some("") => Vec::new(),
            Some(json) => serde_json::from_str(json).map_err(|e| {
                GraphError::InvariantViolation(format!(
                    "bad file_refs JSON on node {}: {}",
                    raw.id, e
                ))
            })?,
        };

        let embedding = match raw.embedding {
            None => None,
            Some(bytes) => Some(embedding_from_bytes(&bytes).ok_or_else(|| {
                GraphError::InvariantViolation(format!(
                    "embedding blob on node {} is not a float32 buffer",
                    raw.id
                ))
            })?),
        };

        Ok(ConceptNode {
            created_at: parse_ts(&raw.created_at, "created_at")?,
            updated_at: parse_ts(&raw.updated_at, "updated_at")?,
            removed_at: parse_ts_opt(raw.removed_at, "removed_at")?,
            merge_timestamp: parse_ts_opt(raw.merge_timestamp, "merge_timestamp")?,
            id: raw.id,
            name: raw.name,
            kind,
            summary: raw.summary,
            why: raw.why,
            file_refs,
            parent_id: raw.parent_id,
            created_by_task: raw.created_by_task,
            removed_reason: raw.removed_reason,
            embedding,
            merge_group: raw.merge_group,
            needs_merge: raw.needs_merge,
            source_branch: raw.source_branch,
        })
    }

    fn raw_edge(row: &rusqlite::Row) -> rusqlite::Result<RawEdge> {
        Ok(RawEdge {
            id: row.get("id")?,
            from_id: row.get("from_id")?,
            to_id: row.get("to_id")?,
            relation: row.get("relation")?,
            description: row.get("description")?,
            created_at: row.get("created_at")?,
            merge_group: row.get("merge_group")?,
            needs_merge: row.get("needs_merge")?,
            source_branch: row.get("source_branch")?,
            merge_timestamp: row.get("merge_timestamp")?,
        })
    }

    fn edge_from_raw(raw: RawEdge) -> Result<EdgeRecord> {
        let relation = Relation::parse(&raw.relation).ok_or_else(|| {
            GraphError::InvariantViolation(format!(
                "unknown relation '{}' on edge {}",
                raw.relation, raw.id
            ))
        })?;
        Ok(EdgeRecord {
            created_at: parse_ts(&raw.created_at, "created_at")?,
            merge_timestamp: parse_ts_opt(raw.merge_timestamp, "merge_timestamp")?,
            id: raw.id,
            from_id: raw.from_id,
            to_id: raw.to_id,
            relation,
            description: raw.description,
            merge_group: raw.merge_group,
            needs_merge: raw.needs_merge,
            source_branch: raw.source_branch,
        })
    }

    pub(crate) fn query_nodes<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<Vec<ConceptNode>> {
        let mut stmt = conn.prepare(sql)?;
        let raws = stmt
            .query_map(params, Self::raw_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(Self::node_from_raw).collect()
    }

    fn query_node_opt<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<Option<ConceptNode>> {
        let mut stmt = conn.prepare(sql)?;
        let raw = stmt.query_row(params, Self::raw_node).optional()?;
        raw.map(Self::node_from_raw).transpose()
    }

    pub(crate) fn query_edges<P: rusqlite::Params>(
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<Vec<EdgeRecord>> {
        let mut stmt = conn.prepare(sql)?;
        let raws = stmt
            .query_map(params, Self::raw_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(Self::edge_from_raw).collect()
    }

    // ========================================================================
    // INTEGRITY CHECKS
    // ========================================================================

    /// Fails with `InvalidParent` unless `parent_id` names a live node.
    fn assert_parent_live(conn: &Connection, parent_id: &str) -> Result<()> {
        let live: Option<bool> = conn
            .query_row(
                "SELECT removed_at IS NULL FROM nodes WHERE id = ?1",
                params![parent_id],
                |row| row.get(0),
            )
            .optional()?;
        match live {
            Some(true) => Ok(()),
            _ => Err(GraphError::InvalidParent(parent_id.to_string())),
        }
    }

    /// Walks up the parent chain from `start_parent`, refusing if `node_id`
    /// is encountered. The parent relation must stay a forest.
    fn assert_no_cycle(conn: &Connection, node_id: &str, start_parent: &str) -> Result<()> {
        let mut current = Some(start_parent.to_string());
        let mut hops = 0u32;
        while let Some(pid) = current {
            if pid == node_id {
                return Err(GraphError::InvalidParent(format!(
                    "{} (would create an ownership cycle)",
                    start_parent
                )));
            }
            hops += 1;
            if hops > 10_000 {
                return Err(GraphError::InvariantViolation(
                    "parent chain exceeds depth limit".to_string(),
                ));
            }
            current = conn
                .query_row(
                    "SELECT parent_id FROM nodes WHERE id = ?1",
                    params![pid],
                    |row| row.get::<_, Option<String>>(0),
                )
                .optional()?
                .flatten();
        }
        Ok(())
    }

    fn file_refs_json(refs: &[String]) -> Result<Option<String>> {
        if refs.is_empty() {
            return Ok(None);
        }
        serde_json::to_string(refs)
            .map(Some)
            .map_err(|e| GraphError::InvariantViolation(format!("file_refs serialize: {}", e)))
    }

    // ========================================================================
    // NODE OPERATIONS
    // ========================================================================

    /// Insert a new node with store-assigned timestamps and clean merge
    /// metadata. Fails `Duplicate` if the id exists (live or removed) and
    /// `InvalidParent` if the parent is missing or removed.
    pub fn insert_node(&self, new: &NewConcept) -> Result<ConceptNode> {
        let now = now_secs();
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;

        let exists: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM nodes WHERE id = ?1",
                params![new.id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(GraphError::Duplicate(new.id.clone()));
        }

        if let Some(parent_id) = &new.parent_id {
            Self::assert_parent_live(&tx, parent_id)?;
            Self::assert_no_cycle(&tx, &new.id, parent_id)?;
        }

        tx.execute(
            "INSERT INTO nodes (
                id, name, kind, summary, why, file_refs, parent_id,
                created_by_task, created_at, updated_at, embedding
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                new.id,
                new.name,
                new.kind.as_str(),
                new.summary,
                new.why,
                Self::file_refs_json(&new.file_refs)?,
                new.parent_id,
                new.created_by_task,
                fmt_ts(&now),
                fmt_ts(&now),
                new.embedding.as_deref().map(embedding_to_bytes),
            ],
        )?;
        tx.commit()?;

        Ok(ConceptNode {
            id: new.id.clone(),
            name: new.name.clone(),
            kind: new.kind,
            summary: new.summary.clone(),
            why: new.why.clone(),
            file_refs: new.file_refs.clone(),
            parent_id: new.parent_id.clone(),
            created_by_task: new.created_by_task.clone(),
            created_at: now,
            updated_at: now,
            removed_at: None,
            removed_reason: None,
            embedding: new.embedding.clone(),
            merge_group: None,
            needs_merge: false,
            source_branch: None,
            merge_timestamp: None,
        })
    }

    /// Insert a node row verbatim, carrying timestamps and merge flags as
    /// given. No duplicate/parent checks; the merge engine owns integrity on
    /// this path.
    pub fn insert_node_raw(&self, node: &ConceptNode) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO nodes (
                id, name, kind, summary, why, file_refs, parent_id,
                created_by_task, created_at, updated_at, removed_at,
                removed_reason, embedding, merge_group, needs_merge,
                source_branch, merge_timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                node.id,
                node.name,
                node.kind.as_str(),
                node.summary,
                node.why,
                Self::file_refs_json(&node.file_refs)?,
                node.parent_id,
                node.created_by_task,
                fmt_ts(&node.created_at),
                fmt_ts(&node.updated_at),
                node.removed_at.as_ref().map(fmt_ts),
                node.removed_reason,
                node.embedding.as_deref().map(embedding_to_bytes),
                node.merge_group,
                node.needs_merge,
                node.source_branch,
                node.merge_timestamp.as_ref().map(fmt_ts),
            ],
        )?;
        Ok(())
    }

    /// Get a live node by id.
    pub fn get_node(&self, id: &str) -> Result<Option<ConceptNode>> {
        let reader = self.reader()?;
        Self::query_node_opt(
            &reader,
            "SELECT * FROM nodes WHERE id = ?1 AND removed_at IS NULL",
            params![id],
        )
    }

    /// Get a node by id, soft-deleted rows included.
    pub fn get_node_including_removed(&self, id: &str) -> Result<Option<ConceptNode>> {
        let reader = self.reader()?;
        Self::query_node_opt(&reader, "SELECT * FROM nodes WHERE id = ?1", params![id])
    }

    /// Apply a partial update to a live node. Returns whether any field
    /// actually changed; `updated_at` is only bumped when one did.
    pub fn update_node(&self, id: &str, patch: &ConceptPatch) -> Result<bool> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;

        let current = Self::query_node_opt(
            &tx,
            "SELECT * FROM nodes WHERE id = ?1 AND removed_at IS NULL",
            params![id],
        )?
        .ok_or_else(|| GraphError::NotFound(id.to_string()))?;

        let name = patch.name.clone().unwrap_or_else(|| current.name.clone());
        let kind = patch.kind.unwrap_or(current.kind);
        let summary = patch
            .summary
            .clone()
            .unwrap_or_else(|| current.summary.clone());
        let why = match &patch.why {
            Some(why) => Some(why.clone()),
            None => current.why.clone(),
        };
        let file_refs = patch
            .file_refs
            .clone()
            .unwrap_or_else(|| current.file_refs.clone());
        let parent_id = match &patch.parent_id {
            Some(parent) => parent.clone(),
            None => current.parent_id.clone(),
        };
        let created_by_task = match &patch.created_by_task {
            Some(task) => Some(task.clone()),
            None => current.created_by_task.clone(),
        };
        let embedding = match &patch.embedding {
            Some(vector) => Some(vector.clone()),
            None => current.embedding.clone(),
        };

        let changed = name != current.name
            || kind != current.kind
            || summary != current.summary
            || why != current.why
            || file_refs != current.file_refs
            || parent_id != current.parent_id
            || created_by_task != current.created_by_task
            || embedding != current.embedding;

        if !changed {
            return Ok(false);
        }

        if parent_id != current.parent_id {
            if let Some(new_parent) = &parent_id {
                Self::assert_parent_live(&tx, new_parent)?;
                Self::assert_no_cycle(&tx, id, new_parent)?;
            }
        }

        tx.execute(
            "UPDATE nodes SET
                name = ?1, kind = ?2, summary = ?3, why = ?4, file_refs = ?5,
                parent_id = ?6, created_by_task = ?7, embedding = ?8, updated_at = ?9
             WHERE id = ?10",
            params![
                name,
                kind.as_str(),
                summary,
                why,
                Self::file_refs_json(&file_refs)?,
                parent_id,
                created_by_task,
                embedding.as_deref().map(embedding_to_bytes),
                fmt_ts(&now_secs()),
                id,
            ],
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Soft-delete a node: stamp `removed_at`/`removed_reason`, hard-delete
    /// every incident edge, and clear `parent_id` on live children (they
    /// become roots). One transaction.
    pub fn soft_delete_node(&self, id: &str, reason: &str) -> Result<()> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;

        let removed: Option<bool> = tx
            .query_row(
                "SELECT removed_at IS NOT NULL FROM nodes WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        match removed {
            None => return Err(GraphError::NotFound(id.to_string())),
            Some(true) => return Err(GraphError::AlreadyRemoved(id.to_string())),
            Some(false) => {}
        }

        tx.execute(
            "DELETE FROM edges WHERE from_id = ?1 OR to_id = ?1",
            params![id],
        )?;
        tx.execute(
            "UPDATE nodes SET parent_id = NULL WHERE parent_id = ?1 AND removed_at IS NULL",
            params![id],
        )?;
        tx.execute(
            "UPDATE nodes SET removed_at = ?1, removed_reason = ?2 WHERE id = ?3",
            params![fmt_ts(&now_secs()), reason, id],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Remove a node row and its incident edges unconditionally. Only used
    /// by merge resolution.
    pub fn hard_delete_node(&self, id: &str) -> Result<()> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        tx.execute(
            "DELETE FROM edges WHERE from_id = ?1 OR to_id = ?1",
            params![id],
        )?;
        tx.execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    /// Atomic identifier substitution: the node row, every child's
    /// `parent_id`, and both endpoints of every incident edge.
    ///
    /// The `parent_id -> id` foreign key would reject the intermediate
    /// states, so enforcement is switched off around the transaction
    /// (SQLite ignores the pragma inside one) and restored afterwards.
    pub fn rename_node_id(&self, old: &str, new: &str) -> Result<()> {
        let mut writer = self.writer()?;
        writer.pragma_update(None, "foreign_keys", false)?;

        let run = |writer: &mut Connection| -> Result<()> {
            let tx = writer.transaction()?;
            let updated = tx.execute("UPDATE nodes SET id = ?1 WHERE id = ?2", params![new, old])?;
            if updated == 0 {
                return Err(GraphError::NotFound(old.to_string()));
            }
            tx.execute(
                "UPDATE nodes SET parent_id = ?1 WHERE parent_id = ?2",
                params![new, old],
            )?;
            tx.execute(
                "UPDATE edges SET from_id = ?1 WHERE from_id = ?2",
                params![new, old],
            )?;
            tx.execute(
                "UPDATE edges SET to_id = ?1 WHERE to_id = ?2",
                params![new, old],
            )?;
            tx.commit()?;
            Ok(())
        };

        let result = run(&mut writer);
        writer.pragma_update(None, "foreign_keys", true)?;
        result
    }

    // ========================================================================
    // EDGE OPERATIONS
    // ========================================================================

    /// Insert an edge between two live nodes. Fails `NotFound` naming the
    /// missing endpoint. Duplicate `(from, to, relation)` rows are allowed.
    pub fn insert_edge(&self, new: &NewEdge) -> Result<i64> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;

        for endpoint in [&new.from_id, &new.to_id] {
            let live: Option<bool> = tx
                .query_row(
                    "SELECT removed_at IS NULL FROM nodes WHERE id = ?1",
                    params![endpoint],
                    |row| row.get(0),
                )
                .optional()?;
            if live != Some(true) {
                return Err(GraphError::NotFound(endpoint.to_string()));
            }
        }

        tx.execute(
            "INSERT INTO edges (from_id, to_id, relation, description, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                new.from_id,
                new.to_id,
                new.relation.as_str(),
                new.description,
                fmt_ts(&now_secs()),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    /// Insert an edge row verbatim (merge import path). The stored `id` is
    /// still assigned by the store; everything else is carried as given.
    pub fn insert_edge_raw(&self, edge: &EdgeRecord) -> Result<i64> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO edges (
                from_id, to_id, relation, description, created_at,
                merge_group, needs_merge, source_branch, merge_timestamp
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                edge.from_id,
                edge.to_id,
                edge.relation.as_str(),
                edge.description,
                fmt_ts(&edge.created_at),
                edge.merge_group,
                edge.needs_merge,
                edge.source_branch,
                edge.merge_timestamp.as_ref().map(fmt_ts),
            ],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Delete every edge matching `(from, to, relation)`. Returns how many
    /// rows went away.
    pub fn delete_edge(&self, from: &str, to: &str, relation: Relation) -> Result<usize> {
        let writer = self.writer()?;
        let deleted = writer.execute(
            "DELETE FROM edges WHERE from_id = ?1 AND to_id = ?2 AND relation = ?3",
            params![from, to, relation.as_str()],
        )?;
        Ok(deleted)
    }

    /// Outgoing edges of a node, each joined with the live neighbor's name.
    /// Edges to removed neighbors cannot exist (cascade), but conflicted
    /// neighbors are included so conflict tooling can see them.
    pub fn get_outgoing_edges(&self, id: &str) -> Result<Vec<EdgeWithNeighbor>> {
        self.neighbor_edges(id, true)
    }

    /// Incoming edges of a node, each joined with the neighbor's name.
    pub fn get_incoming_edges(&self, id: &str) -> Result<Vec<EdgeWithNeighbor>> {
        self.neighbor_edges(id, false)
    }

    fn neighbor_edges(&self, id: &str, outgoing: bool) -> Result<Vec<EdgeWithNeighbor>> {
        let sql = if outgoing {
            "SELECT e.id, e.from_id, e.to_id, e.relation, e.description, e.created_at,
                    n.name AS neighbor_name
             FROM edges e JOIN nodes n ON n.id = e.to_id
             WHERE e.from_id = ?1 AND n.removed_at IS NULL
             ORDER BY e.id"
        } else {
            "SELECT e.id, e.from_id, e.to_id, e.relation, e.description, e.created_at,
                    n.name AS neighbor_name
             FROM edges e JOIN nodes n ON n.id = e.from_id
             WHERE e.to_id = ?1 AND n.removed_at IS NULL
             ORDER BY e.id"
        };

        let reader = self.reader()?;
        let mut stmt = reader.prepare(sql)?;
        let rows = stmt
            .query_map(params![id], |row| {
                Ok((
                    row.get::<_, i64>("id")?,
                    row.get::<_, String>("from_id")?,
                    row.get::<_, String>("to_id")?,
                    row.get::<_, String>("relation")?,
                    row.get::<_, Option<String>>("description")?,
                    row.get::<_, String>("created_at")?,
                    row.get::<_, String>("neighbor_name")?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(
                |(id, from_id, to_id, relation, description, created_at, neighbor_name)| {
                    let relation = Relation::parse(&relation).ok_or_else(|| {
                        GraphError::InvariantViolation(format!(
                            "unknown relation '{}' on edge {}",
                            relation, id
                        ))
                    })?;
                    Ok(EdgeWithNeighbor {
                        id,
                        from_id,
                        to_id,
                        relation,
                        description,
                        created_at: parse_ts(&created_at, "created_at")?,
                        neighbor_name,
                    })
                },
            )
            .collect()
    }

    // ========================================================================
    // GRAPH QUERIES
    // ========================================================================

    /// Live, non-conflicted children of a node, ordered by name.
    pub fn get_children(&self, parent_id: &str) -> Result<Vec<ConceptNode>> {
        let reader = self.reader()?;
        Self::query_nodes(
            &reader,
            "SELECT * FROM nodes
             WHERE parent_id = ?1 AND removed_at IS NULL AND needs_merge = 0
             ORDER BY name",
            params![parent_id],
        )
    }

    /// Live, non-conflicted nodes with no parent, ordered by name.
    pub fn get_root_nodes(&self) -> Result<Vec<ConceptNode>> {
        let reader = self.reader()?;
        Self::query_nodes(
            &reader,
            "SELECT * FROM nodes
             WHERE parent_id IS NULL AND removed_at IS NULL AND needs_merge = 0
             ORDER BY name",
            [],
        )
    }

    /// Live, non-conflicted nodes carrying an embedding; the semantic search
    /// candidate set.
    pub fn get_all_active_nodes_with_embeddings(&self) -> Result<Vec<ConceptNode>> {
        let reader = self.reader()?;
        Self::query_nodes(
            &reader,
            "SELECT * FROM nodes
             WHERE removed_at IS NULL AND needs_merge = 0 AND embedding IS NOT NULL
             ORDER BY id",
            [],
        )
    }

    /// Store-wide counters.
    pub fn get_stats(&self) -> Result<GraphStats> {
        let reader = self.reader()?;
        let nodes: i64 = reader.query_row(
            "SELECT COUNT(*) FROM nodes WHERE removed_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        let edges: i64 = reader.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        let removed: i64 = reader.query_row(
            "SELECT COUNT(*) FROM nodes WHERE removed_at IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(GraphStats {
            nodes,
            edges,
            removed,
        })
    }

    /// Live node count per kind.
    pub fn get_kinds_breakdown(&self) -> Result<BTreeMap<String, i64>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT kind, COUNT(*) FROM nodes WHERE removed_at IS NULL GROUP BY kind",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows.into_iter().collect())
    }

    // ========================================================================
    // MERGE HELPERS
    // ========================================================================

    /// Every node flagged `needs_merge`, grouped by merge group then id.
    pub fn get_conflict_nodes(&self) -> Result<Vec<ConceptNode>> {
        let reader = self.reader()?;
        Self::query_nodes(
            &reader,
            "SELECT * FROM nodes WHERE needs_merge = 1 ORDER BY merge_group, id",
            [],
        )
    }

    /// Nodes belonging to one merge group (conflicted or already cleared).
    pub fn get_nodes_by_merge_group(&self, merge_group: &str) -> Result<Vec<ConceptNode>> {
        let reader = self.reader()?;
        Self::query_nodes(
            &reader,
            "SELECT * FROM nodes WHERE merge_group = ?1 ORDER BY id",
            params![merge_group],
        )
    }

    /// Clear all four merge-metadata fields on one node.
    pub fn clear_node_merge_flags(&self, id: &str) -> Result<()> {
        let writer = self.writer()?;
        let updated = writer.execute(
            "UPDATE nodes SET merge_group = NULL, needs_merge = 0,
                              source_branch = NULL, merge_timestamp = NULL
             WHERE id = ?1",
            params![id],
        )?;
        if updated == 0 {
            return Err(GraphError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Clear merge metadata on every edge in a merge group.
    pub fn clear_edge_merge_flags_by_group(&self, merge_group: &str) -> Result<usize> {
        let writer = self.writer()?;
        let updated = writer.execute(
            "UPDATE edges SET merge_group = NULL, needs_merge = 0,
                              source_branch = NULL, merge_timestamp = NULL
             WHERE merge_group = ?1",
            params![merge_group],
        )?;
        Ok(updated)
    }

    /// Every node row, removed and conflicted included.
    pub fn get_all_nodes_raw(&self) -> Result<Vec<ConceptNode>> {
        let reader = self.reader()?;
        Self::query_nodes(&reader, "SELECT * FROM nodes ORDER BY id", [])
    }

    /// Every edge row.
    pub fn get_all_edges_raw(&self) -> Result<Vec<EdgeRecord>> {
        let reader = self.reader()?;
        Self::query_edges(&reader, "SELECT * FROM edges ORDER BY id", [])
    }
}

// ============================================================================
// TESTS
// ============================================================================
