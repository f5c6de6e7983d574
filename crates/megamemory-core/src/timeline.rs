//! Timeline Synthesis
//!
//! Stores upgraded from pre-v3 schemas have an empty timeline table. History
//! consumers can still get a usable activity log by projecting each node's
//! `created_at` / `updated_at` / `removed_at` into synthetic entries and
//! merging them with whatever real rows exist. A synthetic record is dropped
//! when a real counterpart (same tool touching the same node) is present,
//! so one underlying event never appears twice.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::graph::{TimelineEntry, TimelineFilter};
use crate::store::GraphStore;

/// Sequence number carried by synthesized entries. Real rows start at 1, so
/// display ordering falls back to timestamps for synthetic rows.
pub const SYNTHETIC_SEQ: i64 = 0;

fn synthetic(
    tool: &str,
    node_id: &str,
    summary: String,
    timestamp: DateTime<Utc>,
) -> TimelineEntry {
    TimelineEntry {
        seq: SYNTHETIC_SEQ,
        timestamp,
        tool: tool.to_string(),
        params: "{}".to_string(),
        result_summary: summary,
        is_write: true,
        is_error: false,
        affected_ids: vec![node_id.to_string()],
    }
}

/// Reconstruct an activity log for the store, synthesizing entries from node
/// timestamps and deduplicating against real timeline rows. The result is
/// ordered by timestamp, real entries first within a tie.
pub fn timeline_with_synthesis(store: &GraphStore) -> Result<Vec<TimelineEntry>> {
    let real = store.get_timeline_entries(&TimelineFilter::default())?;

    // Key: (tool, node id) of every real record
    let mut covered: HashSet<(String, String)> = HashSet::new();
    for entry in &real {
        for id in &entry.affected_ids {
            covered.insert((entry.tool.clone(), id.clone()));
        }
    }

    let mut merged = real;
    for node in store.get_all_nodes_raw()? {
        let mut push = |tool: &str, summary: String, timestamp: DateTime<Utc>| {
            if !covered.contains(&(tool.to_string(), node.id.clone())) {
                merged.push(synthetic(tool, &node.id, summary, timestamp));
            }
        };

        push(
            "create_concept",
            format!("created {} (synthesized)", node.id),
            node.created_at,
        );
        if node.updated_at > node.created_at {
            push(
                "update_concept",
                format!("updated {} (synthesized)", node.id),
                node.updated_at,
            );
        }
        if let Some(removed_at) = node.removed_at {
            push(
                "remove_concept",
                format!("removed {} (synthesized)", node.id),
                removed_at,
            );
        }
    }

    merged.sort_by_key(|e| (e.timestamp, e.seq == SYNTHETIC_SEQ, e.seq));
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ConceptKind, NewConcept, NewTimelineEntry};
    use tempfile::TempDir;

    fn test_store() -> (GraphStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::open(Some(dir.path().join("test.db"))).unwrap();
        (store, dir)
    }

    fn concept(id: &str) -> NewConcept {
        NewConcept {
            id: id.to_string(),
            name: id.to_string(),
            kind: ConceptKind::Module,
            summary: format!("summary of {}", id),
            why: None,
            file_refs: vec![],
            parent_id: None,
            created_by_task: None,
            embedding: None,
        }
    }

    #[test]
    fn empty_store_yields_empty_timeline() {
        let (store, _dir) = test_store();
        assert!(timeline_with_synthesis(&store).unwrap().is_empty());
    }

    #[test]
    fn nodes_without_timeline_rows_are_synthesized() {
        let (store, _dir) = test_store();
        store.insert_node(&concept("auth")).unwrap();
        store.insert_node(&concept("gone")).unwrap();
        store.soft_delete_node("gone", "retired").unwrap();

        let entries = timeline_with_synthesis(&store).unwrap();
        let tools: Vec<&str> = entries.iter().map(|e| e.tool.as_str()).collect();
        assert!(tools.contains(&"create_concept"));
        assert!(tools.contains(&"remove_concept"));

        // Two creates plus one remove; updated_at == created_at produces
        // no update entry
        assert_eq!(entries.len(), 3);
        for entry in &entries {
            assert_eq!(entry.seq, SYNTHETIC_SEQ);
            assert!(entry.result_summary.contains("synthesized"));
        }
    }

    #[test]
    fn real_rows_suppress_their_synthetic_twin() {
        let (store, _dir) = test_store();
        let node = store.insert_node(&concept("auth")).unwrap();

        // A real timeline row recorded in the same second as the insert
        store
            .insert_timeline_entry(&NewTimelineEntry {
                tool: "create_concept".to_string(),
                params: "{}".to_string(),
                result_summary: "created auth".to_string(),
                is_write: true,
                is_error: false,
                affected_ids: vec![node.id.clone()],
            })
            .unwrap();

        let entries = timeline_with_synthesis(&store).unwrap();
        let creates: Vec<&TimelineEntry> = entries
            .iter()
            .filter(|e| e.tool == "create_concept")
            .collect();
        assert_eq!(creates.len(), 1);
        assert_eq!(creates[0].result_summary, "created auth");
    }

    #[test]
    fn result_is_time_ordered() {
        let (store, _dir) = test_store();
        store.insert_node(&concept("a")).unwrap();
        store.insert_node(&concept("b")).unwrap();

        let entries = timeline_with_synthesis(&store).unwrap();
        for window in entries.windows(2) {
            assert!(window[0].timestamp <= window[1].timestamp);
        }
    }
}
