//! Map a result report back onto the canonical tree.
//!
//! The report has its own hierarchy keyed by human-readable descriptions, so nodes are matched by a
//! cascade rather than by id. The walk follows the tree (not the report): a suite is reported as
//! completed as soon as it is visited, and tests only produce an event when the report carries a
//! result for them.

use serde::{Deserialize, Serialize};

use crate::node::{NodeKind, TestNode};
use crate::report::{parse_report, ReportNode, ReportParseError};

/// UI state of a suite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuiteState {
    Running,
    Completed,
}

/// UI state of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestState {
    Running,
    Passed,
    Failed,
    Skipped,
    Errored,
}

/// One state transition derived from a report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    Suite {
        id: String,
        state: SuiteState,
    },
    Test {
        id: String,
        state: TestState,
        message: Option<String>,
    },
}

impl StateChange {
    pub fn id(&self) -> &str {
        match self {
            StateChange::Suite { id, .. } | StateChange::Test { id, .. } => id,
        }
    }
}

/// Map a raw `result` token to a test state.
///
/// ## Notes
/// - `Failure`/`Success`/`Ignored`/`Inconclusive` are the NUnit 2.5 tokens Pester writes.
/// - Unknown tokens map to `Skipped` so a future runner can never turn a test red by accident.
pub fn map_result_token(token: &str) -> TestState {
    match token {
        "Failure" => TestState::Failed,
        "Success" => TestState::Passed,
        "Ignored" | "Inconclusive" => TestState::Skipped,
        other => {
            tracing::debug!(token = other, "unrecognized result token, treating as skipped");
            TestState::Skipped
        }
    }
}

/// Correlate a parsed report against the tree.
///
/// ## Parameters
/// - `root`: the canonical tree snapshot; paired with `report_root` without matching.
/// - `report_root`: the report's top-level `test-suite`.
///
/// ## Returns
/// - State changes in tree order: each suite's `Completed` precedes the events of its children.
#[tracing::instrument(skip_all, fields(root = %root.id))]
pub fn correlate(root: &TestNode, report_root: &ReportNode) -> Vec<StateChange> {
    let mut changes = Vec::new();
    visit(root, report_root, &mut changes);
    tracing::debug!(changes = changes.len(), "correlated result report");
    changes
}

/// Parse `xml` and correlate it against `root`.
pub fn correlate_report(root: &TestNode, xml: &str) -> Result<Vec<StateChange>, ReportParseError> {
    let report_root = parse_report(xml)?;
    Ok(correlate(root, &report_root))
}

fn visit(node: &TestNode, report: &ReportNode, changes: &mut Vec<StateChange>) {
    match node.kind {
        NodeKind::Suite => {
            changes.push(StateChange::Suite {
                id: node.id.clone(),
                state: SuiteState::Completed,
            });
            for child in &node.children {
                if let Some(matched) = find_match(&node.label, child, &report.children) {
                    visit(child, matched, changes);
                }
            }
        }
        NodeKind::Test => {
            let Some(token) = report.result.as_deref() else {
                return;
            };
            changes.push(StateChange::Test {
                id: node.id.clone(),
                state: map_result_token(token),
                message: report.message.clone(),
            });
        }
    }
}

/// Find the report child for `child`, trying each key across all candidates before the next key.
fn find_match<'r>(parent_label: &str, child: &TestNode, candidates: &'r [ReportNode]) -> Option<&'r ReportNode> {
    let composed = format!("{parent_label}.{}", child.label);
    [child.id.as_str(), child.label.as_str(), composed.as_str()]
        .into_iter()
        .find_map(|key| {
            candidates
                .iter()
                .find(|candidate| candidate.description.as_deref() == Some(key))
        })
}
