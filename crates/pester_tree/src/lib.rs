//! Test tree synchronization and result correlation for Pester test explorers.
//!
//! This crate holds the pure core: node addressing, the canonical tree model, turning discovery
//! output into file subtrees, merging those into the tree, and mapping result reports back onto it.
//!
//! ## Notes
//!
//! - **No IO** and no async: every function here takes strings or trees and returns values. Spawning
//!   PowerShell, reading result files and publishing events live in the `pester-explorer` crate.
//! - Parse failures are returned as typed errors; callers decide how to degrade.

pub mod address;
pub mod correlate;
pub mod discovery;
pub mod node;
pub mod report;
pub mod tree;

pub use address::{NodeAddress, LINE_DELIMITER, ROOT_ID};
pub use correlate::{correlate, correlate_report, map_result_token, StateChange, SuiteState, TestState};
pub use discovery::{build_file_subtrees, extract_json_document, DiscoveryParseError};
pub use node::{NodeKind, TestNode, ROOT_LABEL};
pub use report::{parse_report, ReportNode, ReportParseError};
pub use tree::{merge, CanonicalTree, MergeOutcome};
