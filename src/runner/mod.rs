//! Running tests: targets, the runner collaborator and the dispatcher.

mod dispatch;
mod pwsh;

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use pester_tree::NodeAddress;

use crate::error::ExplorerResult;

pub use dispatch::{DispatchSummary, RunDispatcher, RunPlan};
pub use pwsh::{invoke_script, PwshRunner};

/// Whether a batch runs normally or under a debugger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunMode {
    Run,
    Debug,
}

impl RunMode {
    pub fn is_debug(self) -> bool {
        matches!(self, RunMode::Debug)
    }
}

/// What one runner invocation covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RunTarget {
    /// Every test below the test root.
    Workspace(PathBuf),
    /// Every test in one script.
    File(PathBuf),
    /// The block declared at a one-based line of a script.
    Location { file: PathBuf, line: u32 },
}

impl RunTarget {
    /// Target for an address; `Root` maps to the whole of `test_root`.
    pub fn for_address(address: NodeAddress, test_root: &Path) -> Self {
        match address {
            NodeAddress::Root => RunTarget::Workspace(test_root.to_path_buf()),
            NodeAddress::File(file) => RunTarget::File(file),
            NodeAddress::Located { file, line } => RunTarget::Location { file, line },
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            RunTarget::Workspace(path) | RunTarget::File(path) => path,
            RunTarget::Location { file, .. } => file,
        }
    }

    pub fn line(&self) -> Option<u32> {
        match self {
            RunTarget::Location { line, .. } => Some(*line),
            _ => None,
        }
    }

    pub fn invocation(&self, mode: RunMode, output_path: &Path) -> RunInvocation {
        RunInvocation {
            target_path: self.path().to_path_buf(),
            line: self.line(),
            debug: mode.is_debug(),
            output_path: output_path.to_path_buf(),
        }
    }
}

impl fmt::Display for RunTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunTarget::Workspace(path) | RunTarget::File(path) => write!(f, "{}", path.display()),
            RunTarget::Location { file, line } => write!(f, "{}:{line}", file.display()),
        }
    }
}

/// Arguments handed to a runner collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInvocation {
    pub target_path: PathBuf,
    /// One-based line filter; `None` runs the whole path.
    pub line: Option<u32>,
    pub debug: bool,
    /// Where the NUnit report should be written.
    pub output_path: PathBuf,
}

/// Executes one invocation and returns once the report has been written.
#[async_trait]
pub trait TestRunner: Send + Sync {
    async fn execute(&self, invocation: &RunInvocation) -> ExplorerResult<()>;
}
