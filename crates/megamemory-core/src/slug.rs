//! Id Slugifier
//!
//! Canonicalizes a human display name into a graph identifier, and validates
//! identifiers supplied by callers. Pure functions, no state.
//!
//! Valid ids match `^[a-z0-9]+(-[a-z0-9]+)*(/[a-z0-9]+(-[a-z0-9]+)*)*$`.
//! The `::left` / `::right` merge suffixes are reserved: only the merge
//! engine may produce them, so validation rejects them explicitly.

use crate::error::{GraphError, Result};

/// Reserved id suffixes minted by the merge engine.
pub const MERGE_SUFFIXES: [&str; 2] = ["::left", "::right"];

/// Canonicalize a display name into a slug, optionally nested under a parent.
///
/// Lowercases, folds runs of whitespace and underscores into single hyphens,
/// drops everything outside `[a-z0-9-]`, collapses repeated hyphens, and
/// trims hyphens from both ends. The empty string is a valid output; callers
/// must treat it as an error upstream.
pub fn slugify(name: &str, parent_id: Option<&str>) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for ch in name.to_lowercase().chars() {
        if ch.is_whitespace() || ch == '_' || ch == '-' {
            pending_hyphen = !slug.is_empty();
            continue;
        }
        if !ch.is_ascii_alphanumeric() {
            continue;
        }
        if pending_hyphen {
            slug.push('-');
            pending_hyphen = false;
        }
        slug.push(ch);
    }

    match parent_id {
        Some(parent) => format!("{}/{}", parent, slug),
        None => slug,
    }
}

/// Validate an id against the slug grammar.
///
/// Each `/`-separated segment must be non-empty, consist of `[a-z0-9-]`,
/// and neither start nor end with a hyphen (nor contain a doubled one).
pub fn validate_id(raw: &str) -> Result<()> {
    for suffix in MERGE_SUFFIXES {
        if raw.ends_with(suffix) {
            return Err(GraphError::InvalidId(format!(
                "{} (the {} suffix is reserved for merge conflicts)",
                raw, suffix
            )));
        }
    }

    if raw.is_empty() {
        return Err(GraphError::InvalidId("(empty)".to_string()));
    }

    for segment in raw.split('/') {
        if segment.is_empty() || !is_valid_segment(segment) {
            return Err(GraphError::InvalidId(raw.to_string()));
        }
    }

    Ok(())
}

fn is_valid_segment(segment: &str) -> bool {
    let mut prev_hyphen = true; // leading hyphen is invalid
    for ch in segment.chars() {
        match ch {
            'a'..='z' | '0'..='9' => prev_hyphen = false,
            '-' => {
                if prev_hyphen {
                    return false;
                }
                prev_hyphen = true;
            }
            _ => return false,
        }
    }
    !prev_hyphen // trailing hyphen is invalid
}

// ============================================================================
// TESTS
// ============================================================================
