use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;

use super::{RunInvocation, TestRunner};
use crate::error::{ExplorerError, ExplorerResult};
use crate::powershell;

const INVOKE_SCRIPT: &str = include_str!("../../assets/invoke.ps1");

/// Build the invoke script for one invocation.
///
/// The target path, line filter and report path are spliced in as single-quoted literals; an
/// absent line becomes an empty string, which the script treats as "run everything".
pub fn invoke_script(invocation: &RunInvocation) -> String {
    let line = invocation.line.map(|l| l.to_string()).unwrap_or_default();
    format!(
        "$ScriptPath = {}\n$LineNumber = {}\n$OutputPath = {}\n{INVOKE_SCRIPT}",
        powershell::quote_path(&invocation.target_path),
        powershell::quote_literal(&line),
        powershell::quote_path(&invocation.output_path),
    )
}

/// Runs Pester in a local PowerShell process.
#[derive(Debug, Clone)]
pub struct PwshRunner {
    powershell: PathBuf,
    interactive: bool,
}

impl PwshRunner {
    /// Captures output and logs it; the process is killed if the run is cancelled.
    pub fn new(powershell: impl Into<PathBuf>) -> Self {
        Self {
            powershell: powershell.into(),
            interactive: false,
        }
    }

    /// Inherits the terminal so a user can interact with breakpoints.
    pub fn interactive(powershell: impl Into<PathBuf>) -> Self {
        Self {
            powershell: powershell.into(),
            interactive: true,
        }
    }

    pub fn powershell(&self) -> &Path {
        &self.powershell
    }
}

#[async_trait]
impl TestRunner for PwshRunner {
    #[tracing::instrument(skip_all, fields(target = %invocation.target_path.display(), line = ?invocation.line))]
    async fn execute(&self, invocation: &RunInvocation) -> ExplorerResult<()> {
        let mut command = powershell::command(&self.powershell, &invoke_script(invocation));

        let status = if self.interactive {
            command
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
            command
                .status()
                .await
                .map_err(|err| powershell::spawn_error(&self.powershell, err))?
        } else {
            let output = command
                .output()
                .await
                .map_err(|err| powershell::spawn_error(&self.powershell, err))?;
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                tracing::debug!(stdout = %stdout.trim(), "runner output");
            }
            let stderr = String::from_utf8_lossy(&output.stderr);
            if !stderr.trim().is_empty() {
                tracing::warn!(stderr = %stderr.trim(), "runner wrote to stderr");
            }
            output.status
        };

        if status.success() {
            Ok(())
        } else {
            Err(ExplorerError::Runner(format!("PowerShell exited with {status}")))
        }
    }
}
