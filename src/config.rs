//! Explorer configuration
//!
//! Defaults mirror what a Pester workspace looks like out of the box: test scripts named
//! `*.Tests.ps1` anywhere below the workspace, and results written to `TestExplorerResults.xml` at
//! its root.

use std::env;
use std::path::{Path, PathBuf};

pub const DEFAULT_RESULT_FILE_NAME: &str = "TestExplorerResults.xml";
pub const DEFAULT_TEST_FILE_SUFFIX: &str = ".Tests.ps1";

pub const ENV_POWERSHELL: &str = "PESTER_EXPLORER_PWSH";
pub const ENV_TEST_ROOT: &str = "PESTER_EXPLORER_TEST_ROOT";
pub const ENV_RESULT_FILE: &str = "PESTER_EXPLORER_RESULT_FILE";

/// Explorer configuration for one workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerConfig {
    /// Workspace folder; result files are written and searched for here.
    pub workspace_root: PathBuf,
    /// Directory scanned for test scripts and run as a whole for the `root` id.
    pub test_root: PathBuf,
    /// File name of the NUnit report the runner writes.
    pub result_file_name: String,
    /// Explicit PowerShell executable; searched on `PATH` when unset.
    pub powershell_path: Option<PathBuf>,
    /// Test scripts end with this suffix (the `Tests` segment matches case-insensitively).
    pub test_file_suffix: String,
    /// Run discovery as soon as a session starts.
    pub auto_discover_on_open: bool,
}

impl ExplorerConfig {
    /// Defaults for `workspace_root`.
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        let workspace_root = workspace_root.into();
        Self {
            test_root: workspace_root.clone(),
            workspace_root,
            result_file_name: DEFAULT_RESULT_FILE_NAME.to_string(),
            powershell_path: None,
            test_file_suffix: DEFAULT_TEST_FILE_SUFFIX.to_string(),
            auto_discover_on_open: false,
        }
    }

    /// Defaults for `workspace_root`, overridden by `PESTER_EXPLORER_*` environment variables.
    pub fn from_env(workspace_root: impl Into<PathBuf>) -> Self {
        let mut config = Self::new(workspace_root);
        if let Some(path) = env::var_os(ENV_POWERSHELL) {
            config.powershell_path = Some(PathBuf::from(path));
        }
        if let Some(root) = env::var_os(ENV_TEST_ROOT) {
            config = config.with_test_root(root);
        }
        if let Ok(name) = env::var(ENV_RESULT_FILE) {
            config.result_file_name = name;
        }
        config
    }

    /// Set the test root; relative paths are resolved against the workspace.
    pub fn with_test_root(mut self, test_root: impl Into<PathBuf>) -> Self {
        let test_root = test_root.into();
        self.test_root = if test_root.is_absolute() {
            test_root
        } else {
            self.workspace_root.join(test_root)
        };
        self
    }

    pub fn with_result_file_name(mut self, name: impl Into<String>) -> Self {
        self.result_file_name = name.into();
        self
    }

    pub fn with_powershell_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.powershell_path = Some(path.into());
        self
    }

    pub fn with_auto_discover_on_open(mut self, enabled: bool) -> Self {
        self.auto_discover_on_open = enabled;
        self
    }

    /// Where the runner is told to write its report.
    pub fn result_path(&self) -> PathBuf {
        self.workspace_root.join(&self.result_file_name)
    }

    /// Whether `path` names a test script.
    pub fn is_test_file(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        name.len() > self.test_file_suffix.len()
            && name
                .get(name.len() - self.test_file_suffix.len()..)
                .is_some_and(|suffix| suffix.eq_ignore_ascii_case(&self.test_file_suffix))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ExplorerConfig::new("/ws");
        assert_eq!(config.test_root, PathBuf::from("/ws"));
        assert_eq!(config.result_path(), PathBuf::from("/ws/TestExplorerResults.xml"));
        assert_eq!(config.powershell_path, None);
        assert!(!config.auto_discover_on_open);
    }

    #[test]
    fn test_relative_test_root_is_joined() {
        let config = ExplorerConfig::new("/ws").with_test_root("tests");
        assert_eq!(config.test_root, PathBuf::from("/ws/tests"));

        let config = ExplorerConfig::new("/ws").with_test_root("/elsewhere");
        assert_eq!(config.test_root, PathBuf::from("/elsewhere"));
    }

    #[test]
    fn test_builder_override() {
        let config = ExplorerConfig::new("/ws")
            .with_result_file_name("a.xml")
            .with_result_file_name("b.xml");
        assert_eq!(config.result_path(), PathBuf::from("/ws/b.xml")); // Last value wins
    }

    #[test]
    fn test_is_test_file() {
        let config = ExplorerConfig::new("/ws");
        assert!(config.is_test_file(Path::new("/ws/a.Tests.ps1")));
        assert!(config.is_test_file(Path::new("/ws/a.tests.ps1")));
        assert!(!config.is_test_file(Path::new("/ws/a.ps1")));
        assert!(!config.is_test_file(Path::new("/ws/.Tests.ps1")));
        assert!(!config.is_test_file(Path::new("/ws/a.Tests.ps1.bak")));
    }
}
