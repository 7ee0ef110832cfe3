//! Build file subtrees from the discovery script's output.
//!
//! The discovery process prints a single JSON document shaped like the root suite. PowerShell hosts
//! routinely interleave warnings, module-import chatter or verbose records with stdout, so the
//! document is first located as the outermost balanced `{ ... }` object before being parsed.

use std::collections::HashSet;
use std::path::Path;

use thiserror::Error;

use crate::address::{NodeAddress, ROOT_ID};
use crate::node::{NodeKind, TestNode};

/// The discovery output could not be turned into a tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiscoveryParseError {
    #[error("no JSON document found in discovery output")]
    MissingDocument,

    #[error("discovery output ends inside an unterminated JSON object")]
    Unterminated,

    #[error("invalid discovery document: {0}")]
    Json(String),

    #[error("discovery document is not the root suite (found `{0}`)")]
    NotRoot(String),
}

/// Locate the discovery document in `output`.
///
/// ## Returns
/// - The first balanced `{ ... }` span that is a JSON object with `"id": "root"`, or failing
///   that, the first balanced span that is any JSON object.
///
/// ## Notes
/// - Every `{` is tried as a start, so braces in leading noise (`@{Name=Pester}`, a lone `{` in a
///   verbose record) cannot hide the document that follows.
/// - Braces inside JSON strings (including escaped quotes) are ignored when matching.
pub fn extract_json_document(output: &str) -> Result<&str, DiscoveryParseError> {
    let mut starts = output.match_indices('{').map(|(start, _)| start).peekable();
    if starts.peek().is_none() {
        return Err(DiscoveryParseError::MissingDocument);
    }

    let mut first_object = None;
    let mut first_error = None;
    for span in starts.filter_map(|start| balanced_object_at(output, start)) {
        match serde_json::from_str::<serde_json::Value>(span) {
            Ok(serde_json::Value::Object(object)) => {
                if object.get("id").and_then(serde_json::Value::as_str) == Some(ROOT_ID) {
                    return Ok(span);
                }
                first_object.get_or_insert(span);
            }
            Ok(_) => {}
            Err(err) => {
                first_error.get_or_insert_with(|| err.to_string());
            }
        }
    }

    match (first_object, first_error) {
        (Some(span), _) => Ok(span),
        (None, Some(err)) => Err(DiscoveryParseError::Json(err)),
        (None, None) => Err(DiscoveryParseError::Unterminated),
    }
}

/// The slice from the `{` at `start` to its matching `}`, if the object closes.
fn balanced_object_at(output: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in output[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&output[start..=start + offset]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse discovery output into one suite per discovered file.
///
/// ## Parameters
/// - `output`: raw stdout of the discovery process.
///
/// ## Returns
/// - The root suite's children, normalized: ids re-derived from `(file, line)`, duplicate sibling
///   addresses collapsed to their first occurrence.
///
/// ## Notes
/// - Zero discovered files yields an empty vector, not an error.
#[tracing::instrument(skip_all, fields(output_len = output.len()))]
pub fn build_file_subtrees(output: &str) -> Result<Vec<TestNode>, DiscoveryParseError> {
    let document = extract_json_document(output)?;
    let root: TestNode = serde_json::from_str(document).map_err(|e| DiscoveryParseError::Json(e.to_string()))?;

    if root.id != ROOT_ID || root.kind != NodeKind::Suite {
        return Err(DiscoveryParseError::NotRoot(root.id));
    }

    let files = dedup_children(root.children.into_iter().map(normalize_file).collect());
    tracing::debug!(files = files.len(), "built file subtrees");
    Ok(files)
}

/// Re-key a file-level suite and everything below it.
fn normalize_file(mut file_suite: TestNode) -> TestNode {
    if let Some(file) = file_suite.file.clone() {
        file_suite.id = NodeAddress::file(file).to_wire();
    }
    file_suite.line = None;
    file_suite.children = normalize_children(std::mem::take(&mut file_suite.children), file_suite.file.as_deref());
    file_suite
}

fn normalize_children(children: Vec<TestNode>, parent_file: Option<&Path>) -> Vec<TestNode> {
    let children = children
        .into_iter()
        .map(|mut child| {
            if child.file.is_none() {
                child.file = parent_file.map(Path::to_path_buf);
            }
            if let (Some(file), Some(line)) = (&child.file, child.line) {
                child.id = NodeAddress::located(file, line.saturating_add(1)).to_wire();
            }
            if child.kind == NodeKind::Suite {
                child.children = normalize_children(std::mem::take(&mut child.children), child.file.as_deref());
            } else {
                child.children.clear();
            }
            child
        })
        .collect();
    dedup_children(children)
}

/// Keep only the first sibling for each id.
fn dedup_children(children: Vec<TestNode>) -> Vec<TestNode> {
    let mut seen = HashSet::new();
    let before = children.len();
    let kept: Vec<TestNode> = children
        .into_iter()
        .filter(|child| seen.insert(child.id.clone()))
        .collect();
    if kept.len() != before {
        tracing::debug!(dropped = before - kept.len(), "dropped duplicate test addresses");
    }
    kept
}
