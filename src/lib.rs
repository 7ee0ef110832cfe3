#![forbid(unsafe_code)]
//! Pester test explorer
//!
//! Keeps a tree of Pester suites and tests in sync with the scripts in a workspace, runs selections
//! of it through PowerShell, and maps NUnit result reports back onto the tree as UI events. The
//! pure tree logic lives in the `pester_tree` crate; this crate adds the session, the external
//! processes, and two front ends (a CLI and a JSON-RPC server).
//!
//! ## Panic Policy
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module
//!   enforces `#![deny(clippy::unwrap_used)]`.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.

pub mod adapter;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod events;
pub mod lsp;
pub mod powershell;
pub mod runner;
pub mod version;
pub mod workspace;

pub use adapter::{PesterAdapter, ResultSubscription};
pub use config::ExplorerConfig;
pub use discovery::{DiscoveryCollaborator, PwshDiscovery};
pub use error::{ExplorerError, ExplorerResult};
pub use events::{EventChannel, ExplorerEvent, RetireEvent, TestLoadEvent, TestRunEvent};
pub use runner::{DispatchSummary, PwshRunner, RunDispatcher, RunInvocation, RunMode, RunTarget, TestRunner};
