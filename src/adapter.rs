//! The explorer session for one workspace.
//!
//! [`PesterAdapter`] ties the pieces together: it owns the canonical tree, asks the discovery
//! collaborator for file subtrees, merges them, hands selections to the [`RunDispatcher`], and turns
//! result reports into events on its [`EventChannel`].
//!
//! ## Notes
//!
//! - Tree updates happen under a `std::sync::Mutex` that is only held for the synchronous merge;
//!   every other operation works on an `Arc` snapshot taken up front.
//! - Discovery and report parse failures are logged and leave the tree and UI state as they were.
//!   A missing PowerShell or an ambiguous result file is returned to the caller.

use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pester_tree::{build_file_subtrees, correlate_report, CanonicalTree, MergeOutcome, TestNode};
use tokio::sync::mpsc;

use crate::config::ExplorerConfig;
use crate::discovery::{DiscoveryCollaborator, PwshDiscovery};
use crate::error::{ExplorerError, ExplorerResult};
use crate::events::{EventChannel, ExplorerEvent, RetireEvent, TestLoadEvent, TestRunEvent};
use crate::powershell::locate_powershell;
use crate::runner::{DispatchSummary, PwshRunner, RunDispatcher, RunMode, TestRunner};
use crate::workspace::{find_test_files, locate_result_file};

pub struct PesterAdapter {
    config: ExplorerConfig,
    discovery: Arc<dyn DiscoveryCollaborator>,
    dispatcher: RunDispatcher,
    tree: Mutex<CanonicalTree>,
    events: EventChannel,
}

impl PesterAdapter {
    pub fn new(
        config: ExplorerConfig,
        discovery: Arc<dyn DiscoveryCollaborator>,
        runner: Arc<dyn TestRunner>,
        debugger: Arc<dyn TestRunner>,
    ) -> Self {
        let dispatcher = RunDispatcher::new(config.test_root.clone(), config.result_path(), runner, debugger);
        Self {
            config,
            discovery,
            dispatcher,
            tree: Mutex::new(CanonicalTree::new()),
            events: EventChannel::new(),
        }
    }

    /// Session backed by a local PowerShell for discovery, runs and debug sessions.
    pub fn with_powershell(config: ExplorerConfig) -> ExplorerResult<Self> {
        let powershell = locate_powershell(config.powershell_path.as_deref())?;
        tracing::info!(powershell = %powershell.display(), "using PowerShell");
        let runner = Arc::new(PwshRunner::new(&powershell));
        Ok(Self::new(
            config,
            Arc::new(PwshDiscovery::new(&powershell)),
            runner.clone(),
            runner,
        ))
    }

    pub fn config(&self) -> &ExplorerConfig {
        &self.config
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ExplorerEvent> {
        self.events.subscribe()
    }

    /// Current tree.
    pub fn snapshot(&self) -> Arc<TestNode> {
        self.lock_tree().snapshot()
    }

    /// Discover every test script below the test root.
    ///
    /// ## Returns
    /// - (`ExplorerResult<Arc<TestNode>>`): the tree after merging.
    ///
    /// ## Notes
    /// - Emits load started/finished; the finished event carries the whole tree.
    /// - An existing result report is correlated afterwards, so a reopened workspace shows the
    ///   last known states.
    #[tracing::instrument(skip_all, fields(test_root = %self.config.test_root.display()))]
    pub async fn load(&self) -> ExplorerResult<Arc<TestNode>> {
        tracing::info!("loading Pester tests");
        self.events.emit(TestLoadEvent::Started);

        let files = find_test_files(&self.config.test_root, &self.config);
        tracing::debug!(files = files.len(), "found test scripts");
        let discovered = self.discover_and_merge(&files).await;
        let snapshot = self.snapshot();
        self.finish_load(&snapshot, &discovered);
        discovered.or_else(degrade_discovery)?;

        if let Some(report) = locate_result_file(&self.config.workspace_root, &self.config.result_file_name)? {
            self.results_changed(&report).await?;
        }
        Ok(snapshot)
    }

    /// Re-discover `files` only, leaving the rest of the tree as it is.
    ///
    /// ## Returns
    /// - (`ExplorerResult<Vec<String>>`): ids of the file subtrees that were merged. Their previous
    ///   states are retired.
    #[tracing::instrument(skip_all, fields(files = files.len()))]
    pub async fn reload(&self, files: &[PathBuf]) -> ExplorerResult<Vec<String>> {
        self.events.emit(TestLoadEvent::Started);

        let discovered = self.discover_and_merge(files).await;
        if let Ok(outcome) = &discovered {
            self.events.emit(RetireEvent {
                tests: outcome.touched(),
            });
        }
        let snapshot = self.snapshot();
        self.finish_load(&snapshot, &discovered);

        Ok(discovered.or_else(degrade_discovery)?.touched())
    }

    pub async fn run(&self, ids: &[String]) -> ExplorerResult<DispatchSummary> {
        self.execute(ids, RunMode::Run).await
    }

    pub async fn debug(&self, ids: &[String]) -> ExplorerResult<DispatchSummary> {
        self.execute(ids, RunMode::Debug).await
    }

    /// Cancel the in-flight run, if any.
    pub fn cancel(&self) -> bool {
        self.dispatcher.cancel()
    }

    /// Correlate the report at `path` and emit the resulting states.
    ///
    /// ## Returns
    /// - (`ExplorerResult<usize>`): the number of state events emitted. A report that cannot be
    ///   parsed or no longer exists emits nothing.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub async fn results_changed(&self, path: &Path) -> ExplorerResult<usize> {
        let xml = match tokio::fs::read_to_string(path).await {
            Ok(xml) => xml,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                tracing::debug!("result report disappeared");
                return Ok(0);
            }
            Err(err) => return Err(err.into()),
        };

        let snapshot = self.snapshot();
        let changes = match correlate_report(&snapshot, &xml) {
            Ok(changes) => changes,
            Err(err) => {
                tracing::warn!(error = %ExplorerError::from(err), "ignoring result report");
                return Ok(0);
            }
        };

        let count = changes.len();
        for change in changes {
            self.events.emit(TestRunEvent::from(change));
        }
        tracing::debug!(events = count, "correlated result report");
        Ok(count)
    }

    /// Feed result-report change notifications into this session.
    ///
    /// ## Returns
    /// - A [`ResultSubscription`] for whatever watches the filesystem, and the future that
    ///   correlates each notified path. The future ends once every subscription handle is dropped.
    pub fn watch_results(self: Arc<Self>, capacity: usize) -> (ResultSubscription, impl Future<Output = ()> + Send) {
        let (tx, mut rx) = mpsc::channel::<PathBuf>(capacity.max(1));
        let pump = async move {
            while let Some(path) = rx.recv().await {
                if let Err(err) = self.results_changed(&path).await {
                    tracing::warn!(error = %err, path = %path.display(), "failed to correlate result report");
                }
            }
            tracing::debug!("result subscription closed");
        };
        (ResultSubscription { tx }, pump)
    }

    async fn execute(&self, ids: &[String], mode: RunMode) -> ExplorerResult<DispatchSummary> {
        tracing::info!(?ids, ?mode, "starting tests");
        let snapshot = self.snapshot();
        self.events.emit(TestRunEvent::Started { tests: ids.to_vec() });

        let plan = self.dispatcher.plan(&snapshot, ids);
        for node in &plan.nodes {
            self.mark_running(node);
        }

        let result = match self.dispatcher.execute(&plan.targets, mode).await {
            Ok(mut summary) => {
                summary.skipped = plan.unresolved;
                if summary.cancelled || summary.executed.is_empty() {
                    Ok(summary)
                } else {
                    self.results_changed(self.dispatcher.output_path())
                        .await
                        .map(|_| summary)
                }
            }
            Err(err) => Err(err),
        };

        self.events.emit(TestRunEvent::Finished);
        result
    }

    fn mark_running(&self, node: &TestNode) {
        node.walk(&mut |n| {
            let event = if n.is_suite() {
                TestRunEvent::Suite {
                    suite: n.id.clone(),
                    state: pester_tree::SuiteState::Running,
                }
            } else {
                TestRunEvent::Test {
                    test: n.id.clone(),
                    state: pester_tree::TestState::Running,
                    message: None,
                }
            };
            self.events.emit(event);
        });
    }

    async fn discover_and_merge(&self, files: &[PathBuf]) -> ExplorerResult<MergeOutcome> {
        if files.is_empty() {
            return Ok(MergeOutcome::default());
        }
        let output = self.discovery.discover(files).await?;
        let subtrees = build_file_subtrees(&output)?;
        Ok(self.lock_tree().merge(subtrees))
    }

    fn finish_load(&self, snapshot: &TestNode, discovered: &ExplorerResult<MergeOutcome>) {
        self.events.emit(TestLoadEvent::Finished {
            suite: Some(snapshot.clone()),
            error_message: discovered.as_ref().err().map(ToString::to_string),
        });
    }

    fn lock_tree(&self) -> MutexGuard<'_, CanonicalTree> {
        self.tree.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keep the previous tree on recoverable discovery failures.
fn degrade_discovery(err: ExplorerError) -> ExplorerResult<MergeOutcome> {
    match err {
        ExplorerError::DiscoveryParse(_) | ExplorerError::Runner(_) => {
            tracing::warn!(error = %err, "discovery failed; keeping the previous tree");
            Ok(MergeOutcome::default())
        }
        other => Err(other),
    }
}

/// Handle for reporting result-report changes to a session.
#[derive(Debug, Clone)]
pub struct ResultSubscription {
    tx: mpsc::Sender<PathBuf>,
}

impl ResultSubscription {
    /// Queue `path` for correlation.
    ///
    /// ## Returns
    /// - (`bool`): `false` once the session's pump has stopped.
    pub async fn notify(&self, path: impl Into<PathBuf>) -> bool {
        self.tx.send(path.into()).await.is_ok()
    }
}
