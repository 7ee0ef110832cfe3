//! Custom JSON-RPC methods and notifications spoken by the explorer server.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::notification::Notification;
use tower_lsp::lsp_types::request::Request;

use crate::events::{RetireEvent, TestLoadEvent, TestRunEvent};
use crate::runner::{DispatchSummary, RunInvocation};

pub const LOAD_METHOD: &str = "pester/load";
pub const RUN_METHOD: &str = "pester/run";
pub const DEBUG_METHOD: &str = "pester/debug";
pub const CANCEL_METHOD: &str = "pester/cancel";
pub const RESULTS_CHANGED_METHOD: &str = "pester/resultsChanged";

/// Client-side settings passed as `initializationOptions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializationOptions {
    pub test_root: Option<PathBuf>,
    pub powershell_path: Option<PathBuf>,
    pub result_file_name: Option<String>,
    pub auto_discover_on_open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunParams {
    pub tests: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultsChangedParams {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    /// Number of runner invocations that completed.
    pub executed: usize,
    /// Requested ids that were not in the tree.
    pub skipped: Vec<String>,
    pub cancelled: bool,
}

impl From<DispatchSummary> for RunResponse {
    fn from(summary: DispatchSummary) -> Self {
        Self {
            executed: summary.executed.len(),
            skipped: summary.skipped,
            cancelled: summary.cancelled,
        }
    }
}

/// `pester/testsEvent`: discovery started or finished.
pub enum TestsEvent {}

impl Notification for TestsEvent {
    type Params = TestLoadEvent;
    const METHOD: &'static str = "pester/testsEvent";
}

/// `pester/testStatesEvent`: run lifecycle and node states.
pub enum TestStatesEvent {}

impl Notification for TestStatesEvent {
    type Params = TestRunEvent;
    const METHOD: &'static str = "pester/testStatesEvent";
}

/// `pester/retire`: earlier states for these ids are outdated.
pub enum Retire {}

impl Notification for Retire {
    type Params = RetireEvent;
    const METHOD: &'static str = "pester/retire";
}

/// Server-to-client request asking the editor to debug one target.
///
/// The client answers once the debug session has ended and the report has been written.
pub enum DebugTests {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugTestsParams {
    pub script_path: PathBuf,
    /// One-based line filter, or `None` for the whole path.
    pub line_number: Option<u32>,
    pub output_path: PathBuf,
}

impl From<&RunInvocation> for DebugTestsParams {
    fn from(invocation: &RunInvocation) -> Self {
        Self {
            script_path: invocation.target_path.clone(),
            line_number: invocation.line,
            output_path: invocation.output_path.clone(),
        }
    }
}

impl Request for DebugTests {
    type Params = DebugTestsParams;
    type Result = ();
    const METHOD: &'static str = "pester/debugTests";
}
