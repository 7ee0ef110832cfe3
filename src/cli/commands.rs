//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pester_tree::{TestNode, TestState};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::adapter::PesterAdapter;
use crate::config::ExplorerConfig;
use crate::discovery::PwshDiscovery;
use crate::events::{ExplorerEvent, TestRunEvent};
use crate::powershell::locate_powershell;
use crate::runner::PwshRunner;

use super::{CliError, CliResult, ExitCode};

// ============================================================================
// Session setup
// ============================================================================

fn open_session(config: ExplorerConfig) -> CliResult<PesterAdapter> {
    Ok(PesterAdapter::with_powershell(config)?)
}

/// Like [`open_session`], but debug runs inherit the terminal.
fn open_debug_session(config: ExplorerConfig) -> CliResult<PesterAdapter> {
    let powershell = locate_powershell(config.powershell_path.as_deref())?;
    Ok(PesterAdapter::new(
        config,
        Arc::new(PwshDiscovery::new(&powershell)),
        Arc::new(PwshRunner::new(&powershell)),
        Arc::new(PwshRunner::interactive(&powershell)),
    ))
}

// ============================================================================
// Commands
// ============================================================================

/// Discover tests and print the resulting tree.
pub async fn discover(config: ExplorerConfig, paths: &[PathBuf], json: bool) -> CliResult<ExitCode> {
    let adapter = open_session(config)?;
    let mut events = adapter.subscribe();

    if paths.is_empty() {
        adapter.load().await?;
    } else {
        let files = absolute_paths(adapter.config(), paths);
        let reloaded = adapter.reload(&files).await?;
        tracing::info!(files = reloaded.len(), "reloaded test scripts");
    }

    let drained = drain(&mut events);
    if json {
        print_json_lines(&drained)?;
    } else {
        print!("{}", render_tree(&adapter.snapshot()));
    }
    Ok(ExitCode::SUCCESS)
}

/// Run tests and report their states.
pub async fn run_tests(config: ExplorerConfig, ids: &[String], json: bool) -> CliResult<ExitCode> {
    let adapter = open_session(config)?;
    adapter.load().await?;
    let mut events = adapter.subscribe();

    let summary = adapter.run(ids).await?;
    for id in &summary.skipped {
        eprintln!("warning: no test with id '{id}'");
    }
    report_states(&adapter, &drain(&mut events), json)
}

/// Run tests with PowerShell attached to this terminal.
pub async fn debug_tests(config: ExplorerConfig, ids: &[String], json: bool) -> CliResult<ExitCode> {
    let adapter = open_debug_session(config)?;
    adapter.load().await?;
    let mut events = adapter.subscribe();

    adapter.debug(ids).await?;
    report_states(&adapter, &drain(&mut events), json)
}

/// Map an existing report onto the discovered tree.
pub async fn correlate(config: ExplorerConfig, report: &Path, json: bool) -> CliResult<ExitCode> {
    if !report.is_file() {
        return Err(CliError::failure(format!("Result report '{}' not found", report.display())));
    }

    let adapter = open_session(config)?;
    adapter.load().await?;
    let mut events = adapter.subscribe();

    let count = adapter.results_changed(report).await?;
    tracing::debug!(events = count, "correlated report");
    report_states(&adapter, &drain(&mut events), json)
}

// ============================================================================
// Output
// ============================================================================

fn absolute_paths(config: &ExplorerConfig, paths: &[PathBuf]) -> Vec<PathBuf> {
    paths
        .iter()
        .map(|p| if p.is_absolute() { p.clone() } else { config.workspace_root.join(p) })
        .collect()
}

fn drain(events: &mut UnboundedReceiver<ExplorerEvent>) -> Vec<ExplorerEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

fn print_json_lines(events: &[ExplorerEvent]) -> CliResult<()> {
    for event in events {
        let line = serde_json::to_string(event)
            .map_err(|e| CliError::failure(format!("Cannot serialize event: {e}")))?;
        println!("{line}");
    }
    Ok(())
}

fn report_states(adapter: &PesterAdapter, events: &[ExplorerEvent], json: bool) -> CliResult<ExitCode> {
    if json {
        print_json_lines(events)?;
    } else {
        print!("{}", render_states(&adapter.snapshot(), events));
    }

    let tally = Tally::from_events(events);
    eprintln!(
        "{} passed, {} failed, {} skipped",
        tally.passed, tally.failed, tally.skipped
    );
    Ok(if tally.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Final test states in one batch of events.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Tally {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Tally {
    pub fn from_events(events: &[ExplorerEvent]) -> Self {
        let mut tally = Tally::default();
        for event in events {
            if let ExplorerEvent::Run(TestRunEvent::Test { state, .. }) = event {
                match state {
                    TestState::Passed => tally.passed += 1,
                    TestState::Failed | TestState::Errored => tally.failed += 1,
                    TestState::Skipped => tally.skipped += 1,
                    TestState::Running => {}
                }
            }
        }
        tally
    }
}

/// Indented outline of `root`, one node per line.
pub fn render_tree(root: &TestNode) -> String {
    fn render(node: &TestNode, depth: usize, out: &mut String) {
        let _ = writeln!(out, "{:indent$}{}  [{}]", "", node.label, node.id, indent = depth * 2);
        for child in &node.children {
            render(child, depth + 1, out);
        }
    }

    let mut out = String::new();
    render(root, 0, &mut out);
    out
}

/// One line per terminal test state, with failure messages indented below.
pub fn render_states(root: &TestNode, events: &[ExplorerEvent]) -> String {
    let mut out = String::new();
    for event in events {
        match event {
            ExplorerEvent::Run(TestRunEvent::Test { test, state, message }) if *state != TestState::Running => {
                let label = root.find(test).map_or(test.as_str(), |n| n.label.as_str());
                let _ = writeln!(out, "{:<8} {label}", state_label(*state));
                if let Some(message) = message {
                    for line in message.lines() {
                        let _ = writeln!(out, "         {line}");
                    }
                }
            }
            _ => {}
        }
    }
    out
}

fn state_label(state: TestState) -> &'static str {
    match state {
        TestState::Running => "running",
        TestState::Passed => "passed",
        TestState::Failed => "failed",
        TestState::Skipped => "skipped",
        TestState::Errored => "errored",
    }
}
