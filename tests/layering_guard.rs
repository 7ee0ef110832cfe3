//! Layering guardrails to keep the tree crate free of IO and async machinery.
//!
//! `pester_tree` holds the pure model (addresses, merge, correlation) and is shared by the CLI and
//! the server. This test scans its `Cargo.toml` and fails if a runtime or transport crate appears in
//! `[dependencies]`.

const FORBIDDEN: &[&str] = &["tokio", "tower-lsp", "async-trait", "clap", "tracing-subscriber"];

#[test]
fn tree_crate_has_no_runtime_dependencies() {
    let manifest = include_str!("../crates/pester_tree/Cargo.toml");
    let mut in_dependencies = false;

    for raw_line in manifest.lines() {
        let line = raw_line.trim();
        // Track when we enter/exit the `[dependencies]` table.
        if line.starts_with('[') {
            if line == "[dependencies]" {
                in_dependencies = true;
                continue;
            }
            if in_dependencies {
                break;
            }
        }

        if !in_dependencies || line.is_empty() || line.starts_with('#') {
            continue;
        }

        let name = line.split(['=', '#']).next().unwrap_or("").trim();
        if FORBIDDEN.contains(&name) {
            panic!("`{name}` must not appear in pester_tree's [dependencies]; keep IO in the pester-explorer crate");
        }
    }
}
