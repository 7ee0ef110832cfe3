//! Errors surfaced by the explorer's collaborators and session.
//!
//! Parse failures (`DiscoveryParse`, `ReportParse`) and stale selections (`UnresolvedNodeId`) are
//! recovered where they happen and only show up here so they can be logged uniformly. Environment
//! problems (`MissingRunner`, `AmbiguousResultFile`) have no safe local recovery and are returned
//! to the caller.

use std::path::PathBuf;

use miette::Diagnostic;
use pester_tree::{DiscoveryParseError, ReportParseError};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ExplorerError {
    #[error("failed to read discovery output: {0}")]
    #[diagnostic(code(pester::discovery))]
    DiscoveryParse(#[from] DiscoveryParseError),

    #[error("failed to read result report: {0}")]
    #[diagnostic(code(pester::report))]
    ReportParse(#[from] ReportParseError),

    #[error("more than one result file named '{name}' found")]
    #[diagnostic(
        code(pester::ambiguous_result_file),
        help("keep a single result file in the workspace or configure a different name with --result-file")
    )]
    AmbiguousResultFile { name: String, matches: Vec<PathBuf> },

    #[error("no test with id '{0}' in the current tree")]
    #[diagnostic(code(pester::unresolved_node))]
    UnresolvedNodeId(String),

    #[error("PowerShell is not available: {0}")]
    #[diagnostic(
        code(pester::missing_runner),
        help("install PowerShell 7 (pwsh) or point PESTER_EXPLORER_PWSH / --pwsh at an existing executable")
    )]
    MissingRunner(String),

    #[error("test runner failed: {0}")]
    #[diagnostic(code(pester::runner))]
    Runner(String),

    #[error("I/O error: {0}")]
    #[diagnostic(code(pester::io))]
    Io(#[from] std::io::Error),
}

pub type ExplorerResult<T> = Result<T, ExplorerError>;

impl ExplorerError {
    /// Whether the failure indicates a broken environment rather than bad input.
    pub fn is_environmental(&self) -> bool {
        matches!(self, ExplorerError::MissingRunner(_) | ExplorerError::AmbiguousResultFile { .. })
    }
}
