//! Discovery collaborator: runs the discovery script and returns its raw output.
//!
//! Turning the output into a tree happens in [`pester_tree::build_file_subtrees`]; this module only
//! owns the external process.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{ExplorerError, ExplorerResult};
use crate::powershell;

const DISCOVERY_SCRIPT: &str = include_str!("../assets/discovery.ps1");

/// Produces discovery output for a set of test scripts.
#[async_trait]
pub trait DiscoveryCollaborator: Send + Sync {
    /// Run discovery for `files` and return everything written to stdout.
    async fn discover(&self, files: &[PathBuf]) -> ExplorerResult<String>;
}

/// Build the discovery script for `files`.
pub fn discovery_script(files: &[PathBuf]) -> String {
    let paths = files
        .iter()
        .map(|f| powershell::quote_path(f))
        .collect::<Vec<_>>()
        .join(", ");
    format!("$Path = @({paths})\n{DISCOVERY_SCRIPT}")
}

/// Runs discovery through a local PowerShell.
#[derive(Debug, Clone)]
pub struct PwshDiscovery {
    powershell: PathBuf,
}

impl PwshDiscovery {
    pub fn new(powershell: impl Into<PathBuf>) -> Self {
        Self {
            powershell: powershell.into(),
        }
    }

    pub fn powershell(&self) -> &Path {
        &self.powershell
    }
}

#[async_trait]
impl DiscoveryCollaborator for PwshDiscovery {
    #[tracing::instrument(skip_all, fields(files = files.len()))]
    async fn discover(&self, files: &[PathBuf]) -> ExplorerResult<String> {
        if files.is_empty() {
            return Ok(String::new());
        }

        let output = powershell::command(&self.powershell, &discovery_script(files))
            .output()
            .await
            .map_err(|err| powershell::spawn_error(&self.powershell, err))?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            tracing::warn!(stderr = %stderr.trim(), "discovery wrote to stderr");
        }
        if !output.status.success() {
            return Err(ExplorerError::Runner(format!(
                "discovery exited with {}",
                output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        tracing::debug!(bytes = stdout.len(), "discovery finished");
        Ok(stdout)
    }
}
