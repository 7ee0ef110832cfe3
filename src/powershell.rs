//! Locating PowerShell and building script invocations.

use std::env;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;

use crate::error::{ExplorerError, ExplorerResult};

/// Executables tried, in order, when no explicit path is configured.
pub const POWERSHELL_CANDIDATES: &[&str] = &["pwsh", "pwsh.exe", "powershell.exe"];

/// Arguments placed before the script text.
pub const POWERSHELL_ARGS: &[&str] = &["-NoLogo", "-NoProfile", "-NonInteractive", "-Command"];

/// Find the PowerShell executable.
///
/// ## Parameters
/// - `configured`: an explicit path from configuration; used as-is when it exists.
///
/// ## Returns
/// - (`ExplorerResult<PathBuf>`): the executable, or `MissingRunner` when nothing was found.
pub fn locate_powershell(configured: Option<&Path>) -> ExplorerResult<PathBuf> {
    if let Some(path) = configured {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(ExplorerError::MissingRunner(format!(
            "configured PowerShell '{}' does not exist",
            path.display()
        )));
    }

    let search_path = env::var_os("PATH").unwrap_or_default();
    find_in_path(&search_path, POWERSHELL_CANDIDATES).ok_or_else(|| {
        ExplorerError::MissingRunner(format!("none of {} found on PATH", POWERSHELL_CANDIDATES.join(", ")))
    })
}

fn find_in_path(search_path: &std::ffi::OsStr, candidates: &[&str]) -> Option<PathBuf> {
    candidates.iter().find_map(|name| {
        env::split_paths(search_path)
            .map(|dir| dir.join(name))
            .find(|path| path.is_file())
    })
}

/// Quote `value` as a single-quoted PowerShell string literal.
///
/// Single-quoted literals are not interpolated, so `$`, `&`, `@`, `()` and `[]` in paths are
/// inert; only interior single quotes need doubling.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote a path as a PowerShell literal.
pub fn quote_path(path: &Path) -> String {
    quote_literal(&path.to_string_lossy())
}

/// A `Command` that runs `script` non-interactively with stdout and stderr captured.
///
/// The child is killed when the returned command's future is dropped.
pub fn command(powershell: &Path, script: &str) -> Command {
    let mut command = Command::new(powershell);
    command.args(POWERSHELL_ARGS);
    command.arg(script);
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    command.kill_on_drop(true);
    command
}

/// Map a spawn failure to the explorer's error type.
pub fn spawn_error(powershell: &Path, err: std::io::Error) -> ExplorerError {
    if err.kind() == std::io::ErrorKind::NotFound {
        ExplorerError::MissingRunner(format!("failed to start '{}': {err}", powershell.display()))
    } else {
        ExplorerError::Io(err)
    }
}
