//! Merge Procedure
//!
//! Nodes first, edges after. Pass 1 decides every canonical id (clean,
//! identical, conflict, or carried pre-existing conflict) and builds the
//! side-keyed remap table; pass 2 inserts queued edges with their targets
//! rewritten through the remap. The output is written to a temp sibling and
//! atomically renamed over the destination.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GraphError, Result};
use crate::graph::{ConceptNode, EdgeRecord, Relation};
use crate::store::GraphStore;

use super::canonical_id;

// ============================================================================
// OPTIONS AND REPORT
// ============================================================================

/// Branch labels stamped into `source_branch` on conflicted records.
#[derive(Debug, Clone)]
pub struct MergeLabels {
    pub left: String,
    pub right: String,
}

impl Default for MergeLabels {
    fn default() -> Self {
        Self {
            left: "left".to_string(),
            right: "right".to_string(),
        }
    }
}

/// Counters returned by a merge run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    /// Ids taken without disagreement (one-sided or identical on both)
    pub clean: usize,
    /// Newly minted concept conflicts
    pub concept_conflicts: usize,
    /// Conflicted nodes whose two edge sets also disagreed
    pub edge_conflicts: usize,
    /// Ids removed on one or both sides without disagreement
    pub removed_clean: usize,
    /// Merge-group UUIDs minted by this run
    pub merge_groups: Vec<String>,
}

// ============================================================================
// SIDE DATA
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
}

impl Side {
    fn key(&self, canonical: &str) -> String {
        match self {
            Side::Left => format!("left:{}", canonical),
            Side::Right => format!("right:{}", canonical),
        }
    }

    fn suffixed(&self, canonical: &str) -> String {
        match self {
            Side::Left => format!("{}::left", canonical),
            Side::Right => format!("{}::right", canonical),
        }
    }

    fn label<'a>(&self, labels: &'a MergeLabels) -> &'a str {
        match self {
            Side::Left => &labels.left,
            Side::Right => &labels.right,
        }
    }
}

/// One input graph, loaded and grouped by canonical id.
struct SideData {
    side: Side,
    nodes: BTreeMap<String, Vec<ConceptNode>>,
    edges_by_from: HashMap<String, Vec<EdgeRecord>>,
}

impl SideData {
    fn load(store: &GraphStore, side: Side) -> Result<Self> {
        let mut nodes: BTreeMap<String, Vec<ConceptNode>> = BTreeMap::new();
        for node in store.get_all_nodes_raw()? {
            nodes
                .entry(canonical_id(&node.id).to_string())
                .or_default()
                .push(node);
        }

        let mut edges_by_from: HashMap<String, Vec<EdgeRecord>> = HashMap::new();
        for edge in store.get_all_edges_raw()? {
            edges_by_from
                .entry(canonical_id(&edge.from_id).to_string())
                .or_default()
                .push(edge);
        }

        Ok(Self {
            side,
            nodes,
            edges_by_from,
        })
    }

    /// The single clean record for a canonical id, if this side has exactly
    /// one unsuffixed variant.
    fn clean_record(&self, canonical: &str) -> Option<&ConceptNode> {
        match self.nodes.get(canonical).map(Vec::as_slice) {
            Some([node]) if node.id == canonical => Some(node),
            _ => None,
        }
    }

    fn has_preexisting_conflict(&self, canonical: &str) -> bool {
        self.nodes
            .get(canonical)
            .is_some_and(|variants| variants.iter().any(|n| n.needs_merge))
    }

    fn outgoing(&self, canonical: &str) -> &[EdgeRecord] {
        self.edges_by_from
            .get(canonical)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

// ============================================================================
// CONTENT IDENTITY
// ============================================================================

/// Two node records are content-identical when name, kind, summary, why
/// (null-equivalent to empty), parent, file_refs, and removed-state all
/// match. Embedding, timestamps, and merge metadata are ignored.
fn content_identical(a: &ConceptNode, b: &ConceptNode) -> bool {
    a.name == b.name
        && a.kind == b.kind
        && a.summary == b.summary
        && a.why.as_deref().unwrap_or("") == b.why.as_deref().unwrap_or("")
        && a.parent_id == b.parent_id
        && a.file_refs == b.file_refs
        && a.removed_at.is_some() == b.removed_at.is_some()
}

type EdgeKey = (String, String, Relation, Option<String>);

fn edge_key(edge: &EdgeRecord) -> EdgeKey {
    (
        canonical_id(&edge.from_id).to_string(),
        edge.to_id.clone(),
        edge.relation,
        edge.description.clone(),
    )
}

/// Multiset comparison of two edge sets for the same endpoint.
fn edge_sets_identical(a: &[EdgeRecord], b: &[EdgeRecord]) -> bool {
    let mut ka: Vec<EdgeKey> = a.iter().map(edge_key).collect();
    let mut kb: Vec<EdgeKey> = b.iter().map(edge_key).collect();
    ka.sort();
    kb.sort();
    ka == kb
}

// ============================================================================
// MERGE
// ============================================================================

/// Merge `left_path` and `right_path` into `out_path`.
///
/// Both inputs must exist. The output is built in a temp sibling of
/// `out_path` and renamed into place, so overwriting one of the inputs (the
/// conventional `--into left` case) is atomic. Any filesystem failure is
/// reported as `MergeIO` with the offending path.
pub fn merge_files(
    left_path: &Path,
    right_path: &Path,
    out_path: &Path,
    labels: &MergeLabels,
) -> Result<MergeReport> {
    let left_store = open_input(left_path)?;
    let right_store = open_input(right_path)?;

    let left = SideData::load(&left_store, Side::Left)?;
    let right = SideData::load(&right_store, Side::Right)?;
    drop(left_store);
    drop(right_store);

    let now = crate::store::now_secs();
    let plan = build_plan(&left, &right, labels, &now)?;

    write_output(out_path, &plan)?;

    Ok(plan.report)
}

fn open_input(path: &Path) -> Result<GraphStore> {
    if !path.exists() {
        return Err(GraphError::MergeIo {
            path: path.to_path_buf(),
            detail: "no such file".to_string(),
        });
    }
    GraphStore::open(Some(path.to_path_buf())).map_err(|e| GraphError::MergeIo {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

struct MergePlan {
    /// Nodes to insert, parent_id not yet remapped, tagged with origin side
    nodes: Vec<(ConceptNode, Side)>,
    /// Edges to insert in pass 2, tagged with origin side
    edges: Vec<(EdgeRecord, Side)>,
    /// `"left:<canonical>"` / `"right:<canonical>"` to suffixed target id
    remap: HashMap<String, String>,
    report: MergeReport,
}

fn build_plan(
    left: &SideData,
    right: &SideData,
    labels: &MergeLabels,
    now: &DateTime<Utc>,
) -> Result<MergePlan> {
    let mut plan = MergePlan {
        nodes: Vec::new(),
        edges: Vec::new(),
        remap: HashMap::new(),
        report: MergeReport::default(),
    };

    let canonicals: BTreeSet<&String> = left.nodes.keys().chain(right.nodes.keys()).collect();

    for canonical in canonicals {
        let canonical = canonical.as_str();

        // Pre-existing conflicts carry forward verbatim.
        if left.has_preexisting_conflict(canonical) || right.has_preexisting_conflict(canonical) {
            carry_preexisting(&mut plan, left, right, canonical);
            continue;
        }

        let l = left.clean_record(canonical);
        let r = right.clean_record(canonical);

        match (l, r) {
            (Some(node), None) => {
                queue_clean(&mut plan, node, Side::Left, left.outgoing(canonical));
            }
            (None, Some(node)) => {
                queue_clean(&mut plan, node, Side::Right, right.outgoing(canonical));
            }
            (Some(l_node), Some(r_node)) if content_identical(l_node, r_node) => {
                queue_identical(
                    &mut plan,
                    l_node,
                    left.outgoing(canonical),
                    right.outgoing(canonical),
                );
            }
            (Some(l_node), Some(r_node)) => {
                queue_conflict(
                    &mut plan,
                    canonical,
                    l_node,
                    r_node,
                    left.outgoing(canonical),
                    right.outgoing(canonical),
                    labels,
                    now,
                );
            }
            (None, None) => {
                // Canonical id present only as suffixed variants without
                // needs_merge: a store someone half-resolved by hand.
                return Err(GraphError::InvariantViolation(format!(
                    "id {} has suffixed variants without merge flags",
                    canonical
                )));
            }
        }
    }

    Ok(plan)
}

/// Carry every suffixed variant of a pre-existing conflict forward and
/// register remaps so clean callers keep resolving to a suffixed target.
fn carry_preexisting(plan: &mut MergePlan, left: &SideData, right: &SideData, canonical: &str) {
    let mut seen_nodes: HashSet<String> = HashSet::new();
    let mut seen_edges: HashSet<EdgeKey> = HashSet::new();

    for side_data in [left, right] {
        if let Some(variants) = side_data.nodes.get(canonical) {
            for node in variants {
                if seen_nodes.insert(node.id.clone()) {
                    plan.nodes.push((node.clone(), side_data.side));
                }
            }
        }
        for edge in side_data.outgoing(canonical) {
            let key = (
                edge.from_id.clone(),
                edge.to_id.clone(),
                edge.relation,
                edge.description.clone(),
            );
            if seen_edges.insert(key) {
                plan.edges.push((edge.clone(), side_data.side));
            }
        }
    }

    // Prefer the variant whose suffix matches the origin side, otherwise the
    // first available suffixed variant.
    for side in [Side::Left, Side::Right] {
        let matching = side.suffixed(canonical);
        let target = if seen_nodes.contains(&matching) {
            Some(matching)
        } else {
            let mut suffixed: Vec<&String> = seen_nodes
                .iter()
                .filter(|id| id.as_str() != canonical)
                .collect();
            suffixed.sort();
            suffixed.first().map(|id| (*id).clone())
        };
        if let Some(target) = target {
            plan.remap.insert(side.key(canonical), target);
        }
    }
}

fn queue_clean(plan: &mut MergePlan, node: &ConceptNode, side: Side, edges: &[EdgeRecord]) {
    if node.removed_at.is_some() {
        plan.report.removed_clean += 1;
    } else {
        plan.report.clean += 1;
    }
    plan.nodes.push((node.clone(), side));
    for edge in edges {
        plan.edges.push((edge.clone(), side));
    }
}

/// Identical on both sides: one copy (left's), edge union deduplicated by
/// content key.
fn queue_identical(
    plan: &mut MergePlan,
    node: &ConceptNode,
    left_edges: &[EdgeRecord],
    right_edges: &[EdgeRecord],
) {
    if node.removed_at.is_some() {
        plan.report.removed_clean += 1;
    } else {
        plan.report.clean += 1;
    }
    plan.nodes.push((node.clone(), Side::Left));

    let mut seen: HashSet<EdgeKey> = HashSet::new();
    for (edges, side) in [(left_edges, Side::Left), (right_edges, Side::Right)] {
        for edge in edges {
            if seen.insert(edge_key(edge)) {
                plan.edges.push((edge.clone(), side));
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn queue_conflict(
    plan: &mut MergePlan,
    canonical: &str,
    l_node: &ConceptNode,
    r_node: &ConceptNode,
    left_edges: &[EdgeRecord],
    right_edges: &[EdgeRecord],
    labels: &MergeLabels,
    now: &DateTime<Utc>,
) {
    let group = Uuid::new_v4().to_string();
    plan.report.concept_conflicts += 1;
    plan.report.merge_groups.push(group.clone());

    let edges_differ = !edge_sets_identical(left_edges, right_edges);
    if edges_differ {
        plan.report.edge_conflicts += 1;
    }

    for (node, edges, side) in [
        (l_node, left_edges, Side::Left),
        (r_node, right_edges, Side::Right),
    ] {
        let suffixed = side.suffixed(canonical);

        let mut variant = node.clone();
        variant.id = suffixed.clone();
        variant.merge_group = Some(group.clone());
        variant.needs_merge = true;
        variant.source_branch = Some(side.label(labels).to_string());
        variant.merge_timestamp = Some(*now);
        plan.nodes.push((variant, side));

        plan.remap.insert(side.key(canonical), suffixed.clone());

        for edge in edges {
            let mut queued = edge.clone();
            queued.from_id = suffixed.clone();
            if edges_differ {
                queued.merge_group = Some(group.clone());
                queued.needs_merge = true;
                queued.source_branch = Some(side.label(labels).to_string());
                queued.merge_timestamp = Some(*now);
            }
            plan.edges.push((queued, side));
        }
    }
}

// ============================================================================
// OUTPUT
// ============================================================================

fn temp_sibling(out_path: &Path) -> PathBuf {
    let name = out_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "knowledge.db".to_string());
    out_path.with_file_name(format!("{}.merge-tmp", name))
}

fn write_output(out_path: &Path, plan: &MergePlan) -> Result<()> {
    let tmp = temp_sibling(out_path);
    for stale in [
        tmp.clone(),
        tmp.with_extension("merge-tmp-wal"),
        tmp.with_extension("merge-tmp-shm"),
    ] {
        let _ = std::fs::remove_file(stale);
    }

    let io_err = |detail: String| GraphError::MergeIo {
        path: tmp.clone(),
        detail,
    };

    let out = GraphStore::open(Some(tmp.clone())).map_err(|e| io_err(e.to_string()))?;

    // Nodes arrive in arbitrary parent order; the engine owns integrity on
    // this path, so FK enforcement is off for the bulk import.
    out.set_foreign_keys(false)?;

    let result = (|| -> Result<()> {
        for (node, side) in &plan.nodes {
            let mut node = node.clone();
            if let Some(parent) = &node.parent_id {
                let key = side.key(canonical_id(parent));
                if let Some(target) = plan.remap.get(&key) {
                    node.parent_id = Some(target.clone());
                }
            }
            out.insert_node_raw(&node)?;
        }

        // Pass 2: targets rewritten through the origin side's remap, falling
        // back to the unsuffixed id.
        for (edge, side) in &plan.edges {
            let mut edge = edge.clone();
            let key = side.key(canonical_id(&edge.to_id));
            if let Some(target) = plan.remap.get(&key) {
                edge.to_id = target.clone();
            }
            out.insert_edge_raw(&edge)?;
        }
        Ok(())
    })();

    out.set_foreign_keys(true)?;
    drop(out);

    result?;

    std::fs::rename(&tmp, out_path).map_err(|e| GraphError::MergeIo {
        path: out_path.to_path_buf(),
        detail: format!("rename from {}: {}", tmp.display(), e),
    })?;

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
