//! MegaMemory CLI
//!
//! Branch-merge operations and timeline inspection for the per-project
//! knowledge graph.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{anyhow, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;

use megamemory_core::{
    merge_files, resolve_group, timeline_with_synthesis, ConceptNode, GraphStore, KeepSide,
    MergeLabels, TimelineEntry,
};

/// MegaMemory - Knowledge graph CLI
#[derive(Parser)]
#[command(name = "megamemory")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for the MegaMemory knowledge graph")]
#[command(
    long_about = "MegaMemory keeps a per-project knowledge graph in .megamemory/knowledge.db.\n\nThis CLI merges graph files from parallel branches, inspects and resolves\nmerge conflicts, and renders the activity timeline."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge two graph files, surfacing disagreements as conflict groups
    Merge {
        /// Left graph file (wins ties; overwritten unless --into is given)
        file1: PathBuf,
        /// Right graph file
        file2: PathBuf,
        /// Output file (default: overwrite FILE1 via temp + rename)
        #[arg(long)]
        into: Option<PathBuf>,
        /// Branch label stamped on left-side conflict variants
        #[arg(long, default_value = "left")]
        left_label: String,
        /// Branch label stamped on right-side conflict variants
        #[arg(long, default_value = "right")]
        right_label: String,
    },

    /// List pending merge conflicts
    Conflicts {
        /// Store file (default: .megamemory/knowledge.db or MEGAMEMORY_DB_PATH)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Emit JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },

    /// Resolve one conflict group by keeping a side
    Resolve {
        /// Merge-group UUID (see `megamemory conflicts`)
        merge_group: String,
        /// Which variant survives: left, right, or both
        #[arg(long)]
        keep: Option<String>,
        /// Store file (default: .megamemory/knowledge.db or MEGAMEMORY_DB_PATH)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Show the activity timeline (synthesized from node timestamps when empty)
    Timeline {
        /// Store file (default: .megamemory/knowledge.db or MEGAMEMORY_DB_PATH)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Approximate number of entries to sample
        #[arg(long, default_value = "20")]
        ticks: usize,
        /// Emit JSON instead of formatted text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    match Cli::parse().command {
        Commands::Merge {
            file1,
            file2,
            into,
            left_label,
            right_label,
        } => run_merge(file1, file2, into, left_label, right_label),
        Commands::Conflicts { db, json } => run_conflicts(db, json),
        Commands::Resolve {
            merge_group,
            keep,
            db,
        } => run_resolve(merge_group, keep, db),
        Commands::Timeline { db, ticks, json } => run_timeline(db, ticks, json),
    }
}

// ============================================================================
// MERGE
// ============================================================================

fn run_merge(
    file1: PathBuf,
    file2: PathBuf,
    into: Option<PathBuf>,
    left_label: String,
    right_label: String,
) -> anyhow::Result<()> {
    let out = into.unwrap_or_else(|| file1.clone());
    let labels = MergeLabels {
        left: left_label,
        right: right_label,
    };

    let report = merge_files(&file1, &file2, &out, &labels)?;

    println!("{}", "=== Merge complete ===".cyan().bold());
    println!("{}: {}", "Output".white().bold(), out.display());
    println!("{}: {}", "Clean".green().bold(), report.clean);
    println!(
        "{}: {}",
        "Removed (clean)".green().bold(),
        report.removed_clean
    );
    println!(
        "{}: {}",
        "Concept conflicts".yellow().bold(),
        report.concept_conflicts
    );
    println!(
        "{}: {}",
        "Edge conflicts".yellow().bold(),
        report.edge_conflicts
    );

    if !report.merge_groups.is_empty() {
        println!();
        println!("{}", "Conflict groups:".yellow().bold());
        for group in &report.merge_groups {
            println!("  {}", group);
        }
        println!();
        println!(
            "{}",
            "Run `megamemory conflicts` to inspect, then `megamemory resolve <group> --keep left|right|both`."
                .dimmed()
        );
    }

    Ok(())
}

// ============================================================================
// CONFLICTS
// ============================================================================

fn run_conflicts(db: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let store = GraphStore::open(db)?;

    let mut by_group: BTreeMap<String, Vec<ConceptNode>> = BTreeMap::new();
    for node in store.get_conflict_nodes()? {
        let group = node
            .merge_group
            .clone()
            .unwrap_or_else(|| format!("(unlabeled:{})", node.id));
        by_group.entry(group).or_default().push(node);
    }

    if json {
        let value: Vec<serde_json::Value> = by_group
            .iter()
            .map(|(group, versions)| {
                serde_json::json!({
                    "mergeGroup": group,
                    "versions": versions,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    if by_group.is_empty() {
        println!("{}", "No pending conflicts.".green());
        return Ok(());
    }

    println!(
        "{}",
        format!("=== {} conflict group(s) ===", by_group.len())
            .yellow()
            .bold()
    );
    for (group, versions) in &by_group {
        println!();
        println!("{} {}", "Group".white().bold(), group);
        for version in versions {
            let state = if version.removed_at.is_some() {
                "removed".red().to_string()
            } else {
                "live".green().to_string()
            };
            println!(
                "  {} [{}] ({}) {}",
                version.id.cyan(),
                version.source_branch.as_deref().unwrap_or("?"),
                state,
                version.summary.dimmed()
            );
        }
    }

    Ok(())
}

// ============================================================================
// RESOLVE
// ============================================================================

fn run_resolve(
    merge_group: String,
    keep: Option<String>,
    db: Option<PathBuf>,
) -> anyhow::Result<()> {
    let keep = keep.ok_or_else(|| anyhow!("--keep is required (left, right, or both)"))?;
    let Some(side) = KeepSide::parse(&keep) else {
        bail!("invalid --keep '{}': expected left, right, or both", keep);
    };

    let store = GraphStore::open(db)?;
    let resolution = resolve_group(&store, &merge_group, side)?;

    println!("{}", "=== Conflict resolved ===".green().bold());
    println!(
        "{}: {}",
        "Canonical id".white().bold(),
        resolution.canonical_id
    );
    println!("{}: {}", "Kept".white().bold(), resolution.kept.join(", "));

    Ok(())
}

// ============================================================================
// TIMELINE
// ============================================================================

fn format_entry(entry: &TimelineEntry) -> String {
    let marker = if entry.is_error {
        "✗".red().to_string()
    } else if entry.is_write {
        "●".green().to_string()
    } else {
        "○".dimmed().to_string()
    };
    format!(
        "{} {} {} {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        marker,
        entry.tool.cyan(),
        entry.result_summary
    )
}

fn run_timeline(db: Option<PathBuf>, ticks: usize, json: bool) -> anyhow::Result<()> {
    let store = GraphStore::open(db)?;
    let bounds = store.get_timeline_bounds()?;

    let entries = if bounds.count > 0 {
        store.get_timeline_ticks(ticks)?
    } else {
        // Pre-v3 store or fresh timeline: reconstruct from node timestamps
        let mut synthesized = timeline_with_synthesis(&store)?;
        if synthesized.len() > ticks && ticks > 0 {
            synthesized = sample(synthesized, ticks);
        }
        synthesized
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("{}", "Timeline is empty.".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!("=== Timeline ({} entries recorded) ===", bounds.count)
            .cyan()
            .bold()
    );
    for entry in &entries {
        println!("{}", format_entry(entry));
    }

    Ok(())
}

/// Even subsample keeping first and last, mirroring the store's tick rule.
fn sample(entries: Vec<TimelineEntry>, n: usize) -> Vec<TimelineEntry> {
    if n <= 1 || entries.len() <= 1 {
        return entries.into_iter().take(1).collect();
    }
    let last = entries.len() - 1;
    let mut picked = Vec::with_capacity(n);
    let mut prev = usize::MAX;
    for i in 0..n {
        let idx = ((i as f64) * last as f64 / (n - 1) as f64).round() as usize;
        if idx != prev {
            picked.push(entries[idx.min(last)].clone());
            prev = idx;
        }
    }
    picked
}
