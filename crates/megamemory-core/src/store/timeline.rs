//! Timeline Store Operations
//!
//! The append-only activity log and the time-travel reconstruction queries.
//! `seq` is the authoritative ordering; `timestamp` is non-decreasing but
//! ties at second resolution are expected.

use rusqlite::{params, OptionalExtension};

use chrono::{DateTime, Utc};

use crate::error::{GraphError, Result};
use crate::graph::{
    ConceptNode, EdgeRecord, NewTimelineEntry, TimelineBounds, TimelineEntry, TimelineFilter,
};

use super::sqlite::{fmt_ts, now_secs, GraphStore};

impl GraphStore {
    fn timeline_row(row: &rusqlite::Row) -> rusqlite::Result<(i64, String, String, String, String, bool, bool, String)>
    {
        Ok((
            row.get("seq")?,
            row.get("timestamp")?,
            row.get("tool")?,
            row.get("params")?,
            row.get("result_summary")?,
            row.get("is_write")?,
            row.get("is_error")?,
            row.get("affected_ids")?,
        ))
    }

    fn entry_from_row(
        (seq, timestamp, tool, params, result_summary, is_write, is_error, affected_ids): (
            i64,
            String,
            String,
            String,
            String,
            bool,
            bool,
            String,
        ),
    ) -> Result<TimelineEntry> {
        let timestamp = DateTime::parse_from_rfc3339(&timestamp)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                GraphError::InvariantViolation(format!(
                    "bad timeline timestamp '{}': {}",
                    timestamp, e
                ))
            })?;
        let affected_ids: Vec<String> = serde_json::from_str(&affected_ids).map_err(|e| {
            GraphError::InvariantViolation(format!("bad affected_ids JSON on seq {}: {}", seq, e))
        })?;
        Ok(TimelineEntry {
            seq,
            timestamp,
            tool,
            params,
            result_summary,
            is_write,
            is_error,
            affected_ids,
        })
    }

    /// Append a timeline row. Returns the assigned `seq`.
    pub fn insert_timeline_entry(&self, entry: &NewTimelineEntry) -> Result<i64> {
        let affected = serde_json::to_string(&entry.affected_ids)
            .map_err(|e| GraphError::InvariantViolation(format!("affected_ids serialize: {}", e)))?;
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO timeline (timestamp, tool, params, result_summary, is_write, is_error, affected_ids)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                fmt_ts(&now_secs()),
                entry.tool,
                entry.params,
                entry.result_summary,
                entry.is_write,
                entry.is_error,
                affected,
            ],
        )?;
        Ok(writer.last_insert_rowid())
    }

    /// Cheap `{first, last, count}` summary.
    pub fn get_timeline_bounds(&self) -> Result<TimelineBounds> {
        let reader = self.reader()?;
        let (first, last, count): (Option<String>, Option<String>, i64) = reader.query_row(
            "SELECT MIN(timestamp), MAX(timestamp), COUNT(*) FROM timeline",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        let parse = |value: Option<String>| -> Result<Option<DateTime<Utc>>> {
            value
                .map(|s| {
                    DateTime::parse_from_rfc3339(&s)
                        .map(|dt| dt.with_timezone(&Utc))
                        .map_err(|e| {
                            GraphError::InvariantViolation(format!(
                                "bad timeline timestamp '{}': {}",
                                s, e
                            ))
                        })
                })
                .transpose()
        };

        Ok(TimelineBounds {
            first: parse(first)?,
            last: parse(last)?,
            count,
        })
    }

    /// Ordered scan with optional predicates.
    pub fn get_timeline_entries(&self, filter: &TimelineFilter) -> Result<Vec<TimelineEntry>> {
        let mut sql = String::from("SELECT * FROM timeline WHERE 1=1");
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if filter.writes_only {
            sql.push_str(" AND is_write = 1");
        }
        if let Some(tool) = &filter.tool {
            sql.push_str(" AND tool = ?");
            args.push(Box::new(tool.clone()));
        }
        if let Some(since) = &filter.since {
            sql.push_str(" AND timestamp >= ?");
            args.push(Box::new(fmt_ts(since)));
        }
        if let Some(until) = &filter.until {
            sql.push_str(" AND timestamp <= ?");
            args.push(Box::new(fmt_ts(until)));
        }
        sql.push_str(" ORDER BY seq");
        if let Some(limit) = filter.limit {
            sql.push_str(" LIMIT ?");
            args.push(Box::new(limit));
        }

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt
            .query_map(
                rusqlite::params_from_iter(args.iter().map(|a| a.as_ref())),
                Self::timeline_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.into_iter().map(Self::entry_from_row).collect()
    }

    /// Approximately `n` entries evenly sampled over the sequence. Always
    /// includes the first and last rows; indices collapsed by rounding are
    /// deduplicated.
    pub fn get_timeline_ticks(&self, n: usize) -> Result<Vec<TimelineEntry>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let reader = self.reader()?;
        let seqs: Vec<i64> = {
            let mut stmt = reader.prepare("SELECT seq FROM timeline ORDER BY seq")?;
            stmt.query_map([], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?
        };

        if seqs.is_empty() {
            return Ok(Vec::new());
        }

        let mut picked: Vec<i64> = Vec::with_capacity(n);
        if n == 1 || seqs.len() == 1 {
            picked.push(seqs[0]);
        } else {
            for i in 0..n {
                let idx = ((i as f64) * (seqs.len() - 1) as f64 / (n - 1) as f64).round() as usize;
                let seq = seqs[idx.min(seqs.len() - 1)];
                if picked.last() != Some(&seq) {
                    picked.push(seq);
                }
            }
        }

        let mut entries = Vec::with_capacity(picked.len());
        for seq in picked {
            let row = reader
                .query_row(
                    "SELECT * FROM timeline WHERE seq = ?1",
                    params![seq],
                    Self::timeline_row,
                )
                .optional()?;
            if let Some(row) = row {
                entries.push(Self::entry_from_row(row)?);
            }
        }
        Ok(entries)
    }

    /// Every node that existed at `t`: created on or before, and not yet
    /// removed (or removed strictly after).
    pub fn get_nodes_at_time(&self, t: &DateTime<Utc>) -> Result<Vec<ConceptNode>> {
        let reader = self.reader()?;
        Self::query_nodes(
            &reader,
            "SELECT * FROM nodes
             WHERE created_at <= ?1 AND (removed_at IS NULL OR removed_at > ?1)
             ORDER BY id",
            params![fmt_ts(t)],
        )
    }

    /// Every edge that existed at `t` with both endpoints alive at `t`.
    pub fn get_edges_at_time(&self, t: &DateTime<Utc>) -> Result<Vec<EdgeRecord>> {
        let reader = self.reader()?;
        Self::query_edges(
            &reader,
            "SELECT e.* FROM edges e
             JOIN nodes a ON a.id = e.from_id
             JOIN nodes b ON b.id = e.to_id
             WHERE e.created_at <= ?1
               AND a.created_at <= ?1 AND (a.removed_at IS NULL OR a.removed_at > ?1)
               AND b.created_at <= ?1 AND (b.removed_at IS NULL OR b.removed_at > ?1)
             ORDER BY e.id",
            params![fmt_ts(t)],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ConceptKind, NewConcept, NewEdge, Relation};
    use chrono::Duration;
    use tempfile::TempDir;

    fn test_store() -> (GraphStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::open(Some(dir.path().join("test.db"))).unwrap();
        (store, dir)
    }

    fn entry(tool: &str, is_write: bool) -> NewTimelineEntry {
        NewTimelineEntry {
            tool: tool.to_string(),
            params: "{}".to_string(),
            result_summary: format!("{} ran", tool),
            is_write,
            is_error: false,
            affected_ids: vec![],
        }
    }

    fn concept(id: &str) -> NewConcept {
        NewConcept {
            id: id.to_string(),
            name: id.to_string(),
            kind: ConceptKind::Feature,
            summary: format!("summary of {}", id),
            why: None,
            file_refs: vec![],
            parent_id: None,
            created_by_task: None,
            embedding: None,
        }
    }

    #[test]
    fn seq_is_strictly_increasing() {
        let (store, _dir) = test_store();
        let a = store.insert_timeline_entry(&entry("understand", false)).unwrap();
        let b = store.insert_timeline_entry(&entry("create_concept", true)).unwrap();
        let c = store.insert_timeline_entry(&entry("link", true)).unwrap();
        assert!(a < b && b < c);

        let entries = store.get_timeline_entries(&TimelineFilter::default()).unwrap();
        assert_eq!(entries.len(), 3);
        for window in entries.windows(2) {
            assert!(window[0].seq < window[1].seq);
            assert!(window[0].timestamp <= window[1].timestamp);
        }
    }

    #[test]
    fn bounds_on_empty_and_filled_timeline() {
        let (store, _dir) = test_store();
        let bounds = store.get_timeline_bounds().unwrap();
        assert_eq!(bounds.count, 0);
        assert!(bounds.first.is_none() && bounds.last.is_none());

        store.insert_timeline_entry(&entry("understand", false)).unwrap();
        store.insert_timeline_entry(&entry("link", true)).unwrap();

        let bounds = store.get_timeline_bounds().unwrap();
        assert_eq!(bounds.count, 2);
        assert!(bounds.first.unwrap() <= bounds.last.unwrap());
    }

    #[test]
    fn entries_filter_by_write_and_tool() {
        let (store, _dir) = test_store();
        store.insert_timeline_entry(&entry("understand", false)).unwrap();
        store.insert_timeline_entry(&entry("create_concept", true)).unwrap();
        store.insert_timeline_entry(&entry("remove_concept", true)).unwrap();

        let writes = store
            .get_timeline_entries(&TimelineFilter {
                writes_only: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(writes.len(), 2);

        let creates = store
            .get_timeline_entries(&TimelineFilter {
                tool: Some("create_concept".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].tool, "create_concept");

        let limited = store
            .get_timeline_entries(&TimelineFilter {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].tool, "understand");
    }

    #[test]
    fn ticks_include_first_and_last() {
        let (store, _dir) = test_store();
        for i in 0..20 {
            store
                .insert_timeline_entry(&entry(&format!("tool-{}", i), true))
                .unwrap();
        }

        let ticks = store.get_timeline_ticks(5).unwrap();
        assert_eq!(ticks.len(), 5);
        assert_eq!(ticks[0].tool, "tool-0");
        assert_eq!(ticks.last().unwrap().tool, "tool-19");

        // Monotone and deduplicated
        for window in ticks.windows(2) {
            assert!(window[0].seq < window[1].seq);
        }
    }

    #[test]
    fn ticks_on_short_timeline_return_everything_once() {
        let (store, _dir) = test_store();
        store.insert_timeline_entry(&entry("a", true)).unwrap();
        store.insert_timeline_entry(&entry("b", true)).unwrap();

        let ticks = store.get_timeline_ticks(10).unwrap();
        assert_eq!(ticks.len(), 2);

        assert!(store.get_timeline_ticks(0).unwrap().is_empty());
    }

    #[test]
    fn nodes_at_time_respects_lifecycle() {
        let (store, _dir) = test_store();
        store.insert_node(&concept("early")).unwrap();
        store.insert_node(&concept("doomed")).unwrap();
        store.soft_delete_node("doomed", "retired").unwrap();

        let now = Utc::now();

        // Before creation nothing exists
        let past = now - Duration::days(1);
        assert!(store.get_nodes_at_time(&past).unwrap().is_empty());

        // At present only the live node remains (removed_at <= now)
        let future = now + Duration::seconds(5);
        let nodes = store.get_nodes_at_time(&future).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "early");
    }

    #[test]
    fn edges_at_time_never_dangle() {
        let (store, _dir) = test_store();
        store.insert_node(&concept("a")).unwrap();
        store.insert_node(&concept("b")).unwrap();
        store
            .insert_edge(&NewEdge {
                from_id: "a".to_string(),
                to_id: "b".to_string(),
                relation: Relation::Calls,
                description: None,
            })
            .unwrap();

        let t = Utc::now() + Duration::seconds(5);
        let nodes = store.get_nodes_at_time(&t).unwrap();
        let edges = store.get_edges_at_time(&t).unwrap();
        assert_eq!(edges.len(), 1);

        let node_ids: Vec<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
        for edge in &edges {
            assert!(node_ids.contains(&edge.from_id.as_str()));
            assert!(node_ids.contains(&edge.to_id.as_str()));
        }

        // Before the edge existed, time travel returns none
        let past = Utc::now() - Duration::days(1);
        assert!(store.get_edges_at_time(&past).unwrap().is_empty());
    }
}
