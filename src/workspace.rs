//! Filesystem lookups: test scripts and result reports.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ExplorerConfig;
use crate::error::{ExplorerError, ExplorerResult};

/// Directories never descended into.
const SKIPPED_DIRS: &[&str] = &["node_modules", "target"];

fn is_skipped_dir(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    name.starts_with('.') || SKIPPED_DIRS.contains(&name)
}

fn walk(path: &Path, accept: &dyn Fn(&Path) -> bool, files: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(path) else {
        tracing::debug!(path = %path.display(), "skipping unreadable directory");
        return;
    };
    for entry in entries.flatten() {
        let entry_path = entry.path();
        if entry_path.is_dir() {
            if !is_skipped_dir(&entry_path) {
                walk(&entry_path, accept, files);
            }
        } else if accept(&entry_path) {
            files.push(entry_path);
        }
    }
}

/// Find Pester test scripts under `path`.
///
/// `path` may name a single script or a directory; hidden directories, `node_modules` and `target`
/// are skipped. The result is sorted.
pub fn find_test_files(path: &Path, config: &ExplorerConfig) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if path.is_file() {
        if config.is_test_file(path) {
            files.push(path.to_path_buf());
        }
    } else if path.is_dir() {
        walk(path, &|p: &Path| config.is_test_file(p), &mut files);
    }
    files.sort();
    files
}

/// Find the result report named `name` below `root`.
///
/// ## Returns
/// - `Ok(None)`: no report yet.
/// - `Ok(Some(path))`: exactly one report.
/// - `Err(AmbiguousResultFile)`: more than one; correlating any of them could be wrong.
pub fn locate_result_file(root: &Path, name: &str) -> ExplorerResult<Option<PathBuf>> {
    let mut matches = Vec::new();
    walk(
        root,
        &|p: &Path| p.file_name().is_some_and(|n| n == name),
        &mut matches,
    );
    matches.sort();

    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        _ => Err(ExplorerError::AmbiguousResultFile {
            name: name.to_string(),
            matches,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_find_test_files_skips_hidden_and_build_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("b.Tests.ps1"));
        touch(&root.join("nested/a.tests.ps1"));
        touch(&root.join("nested/helper.ps1"));
        touch(&root.join(".git/x.Tests.ps1"));
        touch(&root.join("node_modules/y.Tests.ps1"));

        let config = ExplorerConfig::new(root);
        let files = find_test_files(root, &config);

        assert_eq!(files, vec![root.join("b.Tests.ps1"), root.join("nested/a.tests.ps1")]);
    }

    #[test]
    fn test_find_test_files_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("one.Tests.ps1");
        touch(&script);
        let config = ExplorerConfig::new(dir.path());

        assert_eq!(find_test_files(&script, &config), vec![script.clone()]);
        assert!(find_test_files(&dir.path().join("missing.Tests.ps1"), &config).is_empty());
    }

    #[test]
    fn test_locate_result_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let name = "TestExplorerResults.xml";

        assert_eq!(locate_result_file(root, name).unwrap(), None);

        touch(&root.join(name));
        assert_eq!(locate_result_file(root, name).unwrap(), Some(root.join(name)));

        touch(&root.join("sub").join(name));
        let err = locate_result_file(root, name).unwrap_err();
        match err {
            ExplorerError::AmbiguousResultFile { matches, .. } => assert_eq!(matches.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }
}
