//! CLI module for the Pester explorer
//!
//! Drives one explorer session from the command line, mainly for scripting and for checking a
//! workspace without an editor.
//!
//! ## Commands
//!
//! - `discover [PATH]...` - Discover tests (all of the test root, or only the given scripts)
//! - `run [ID]...` - Run tests by id (default: `root`)
//! - `debug [ID]...` - Run tests with the PowerShell session attached to the terminal
//! - `correlate <REPORT>` - Map an existing result report onto the discovered tree
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use crate::config::ExplorerConfig;
use crate::error::ExplorerError;
use crate::version::PESTER_EXPLORER_VERSION;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
    /// PowerShell missing or the workspace is ambiguous; nothing was run.
    pub const ENVIRONMENT: ExitCode = ExitCode(2);
}

/// Error type for CLI operations.
///
/// Contains a user-facing message and an exit code. The CLI entry point
/// catches these errors, prints the message, and exits with the code.
#[derive(Debug)]
pub struct CliError {
    /// User-facing error message (already formatted for display)
    pub message: String,
    /// Exit code to return to the shell
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Create a failure error (exit code 1).
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

impl From<ExplorerError> for CliError {
    fn from(err: ExplorerError) -> Self {
        let exit_code = if err.is_environmental() {
            ExitCode::ENVIRONMENT
        } else {
            ExitCode::FAILURE
        };
        // Renders code and help text
        CliError::new(format!("{:?}", miette::Report::new(err)), exit_code)
    }
}

/// Result type for CLI operations.
pub type CliResult<T> = Result<T, CliError>;

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Discover, run and correlate Pester tests
#[derive(Parser, Debug)]
#[command(name = "pester-explorer")]
#[command(version = PESTER_EXPLORER_VERSION)]
#[command(about = "Discover, run and correlate Pester tests", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Workspace folder (default: current directory)
    #[arg(long, global = true, value_name = "DIR")]
    pub workspace: Option<PathBuf>,

    /// Directory scanned for test scripts, relative to the workspace
    #[arg(long = "test-root", global = true, value_name = "DIR")]
    pub test_root: Option<PathBuf>,

    /// PowerShell executable
    #[arg(long, global = true, value_name = "PATH")]
    pub pwsh: Option<PathBuf>,

    /// File name of the result report
    #[arg(long = "result-file", global = true, value_name = "NAME")]
    pub result_file: Option<String>,

    /// Print events as JSON lines
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover tests
    Discover {
        /// Test scripts to (re)discover; all of the test root when omitted
        #[arg(value_name = "PATH")]
        paths: Vec<PathBuf>,
    },

    /// Run tests
    Run {
        /// Node ids to run
        #[arg(value_name = "ID", default_value = "root")]
        ids: Vec<String>,
    },

    /// Run tests with the terminal attached
    Debug {
        /// Node ids to debug
        #[arg(value_name = "ID", default_value = "root")]
        ids: Vec<String>,
    },

    /// Correlate an existing result report
    Correlate {
        /// NUnit report written by Pester
        #[arg(value_name = "REPORT")]
        report: PathBuf,
    },
}

impl Cli {
    /// Session configuration from the environment and flags; flags win.
    pub fn config(&self) -> CliResult<ExplorerConfig> {
        let workspace = match &self.workspace {
            Some(dir) => dir.clone(),
            None => env::current_dir()
                .map_err(|e| CliError::failure(format!("Cannot determine current directory: {e}")))?,
        };

        let mut config = ExplorerConfig::from_env(workspace);
        if let Some(test_root) = &self.test_root {
            config = config.with_test_root(test_root);
        }
        if let Some(pwsh) = &self.pwsh {
            config = config.with_powershell_path(pwsh);
        }
        if let Some(name) = &self.result_file {
            config = config.with_result_file_name(name);
        }
        Ok(config)
    }
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called. All command
/// implementations return `CliResult` and errors are handled here.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

/// Execute the CLI command and return result.
fn execute(cli: Cli) -> CliResult<ExitCode> {
    let config = cli.config()?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| CliError::failure(format!("Cannot start async runtime: {e}")))?;

    let json = cli.json;

    runtime.block_on(async move {
        match cli.command {
            Command::Discover { paths } => commands::discover(config, &paths, json).await,
            Command::Run { ids } => commands::run_tests(config, &ids, json).await,
            Command::Debug { ids } => commands::debug_tests(config, &ids, json).await,
            Command::Correlate { report } => commands::correlate(config, &report, json).await,
        }
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_discover() {
        let cli = Cli::try_parse_from(["pester-explorer", "discover", "a.Tests.ps1", "b.Tests.ps1"]).unwrap();
        if let Command::Discover { paths } = cli.command {
            assert_eq!(paths.len(), 2);
        } else {
            panic!("Expected Discover command");
        }
    }

    #[test]
    fn test_cli_parse_run_defaults_to_root() {
        let cli = Cli::try_parse_from(["pester-explorer", "run"]).unwrap();
        if let Command::Run { ids } = cli.command {
            assert_eq!(ids, vec!["root".to_string()]);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_cli_parse_debug_ids() {
        let cli = Cli::try_parse_from(["pester-explorer", "debug", "/ws/a.Tests.ps1;4"]).unwrap();
        if let Command::Debug { ids } = cli.command {
            assert_eq!(ids, vec!["/ws/a.Tests.ps1;4".to_string()]);
        } else {
            panic!("Expected Debug command");
        }
    }

    #[test]
    fn test_cli_parse_correlate_requires_report() {
        assert!(Cli::try_parse_from(["pester-explorer", "correlate"]).is_err());
        let cli = Cli::try_parse_from(["pester-explorer", "correlate", "out.xml"]).unwrap();
        assert!(matches!(cli.command, Command::Correlate { .. }));
    }

    #[test]
    fn test_global_flags_build_config() {
        let cli = Cli::try_parse_from([
            "pester-explorer",
            "run",
            "--workspace",
            "/ws",
            "--test-root",
            "tests",
            "--pwsh",
            "/opt/pwsh",
            "--result-file",
            "out.xml",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);

        let config = cli.config().unwrap();
        assert_eq!(config.workspace_root, PathBuf::from("/ws"));
        assert_eq!(config.test_root, PathBuf::from("/ws/tests"));
        assert_eq!(config.powershell_path, Some(PathBuf::from("/opt/pwsh")));
        assert_eq!(config.result_path(), PathBuf::from("/ws/out.xml"));
    }

    #[test]
    fn test_explorer_error_renders_help() {
        let err = CliError::from(ExplorerError::MissingRunner("none found".into()));
        assert_eq!(err.exit_code, ExitCode::ENVIRONMENT);
        assert!(err.message.contains("PowerShell is not available"));

        let err = CliError::from(ExplorerError::Runner("exit status 3".into()));
        assert_eq!(err.exit_code, ExitCode::FAILURE);
    }
}
