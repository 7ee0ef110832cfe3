use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use pester_tree::TestNode;
use tokio::sync::oneshot;

use super::{RunMode, RunTarget, TestRunner};
use crate::error::{ExplorerError, ExplorerResult};

/// Resolved selection for one run request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan<'t> {
    /// Resolved nodes, in request order.
    pub nodes: Vec<&'t TestNode>,
    /// Runner targets after de-duplication.
    pub targets: Vec<RunTarget>,
    /// Requested ids missing from the tree.
    pub unresolved: Vec<String>,
}

/// What happened to one dispatched batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    pub executed: Vec<RunTarget>,
    /// Ids skipped because they did not resolve.
    pub skipped: Vec<String>,
    /// The batch was cut short by a newer run or an explicit cancel.
    pub cancelled: bool,
}

struct InFlight {
    generation: u64,
    cancel: oneshot::Sender<()>,
}

/// Maps selected ids to runner invocations and owns the in-flight run.
///
/// ## Notes
/// - At most one normal run is in flight. Starting another signals the previous one, whose pending
///   invocation future is dropped; runner processes are spawned with `kill_on_drop`.
/// - Debug sessions cancel any in-flight run and are then awaited directly.
pub struct RunDispatcher {
    test_root: PathBuf,
    output_path: PathBuf,
    runner: Arc<dyn TestRunner>,
    debugger: Arc<dyn TestRunner>,
    in_flight: Mutex<Option<InFlight>>,
    generation: AtomicU64,
}

impl RunDispatcher {
    pub fn new(
        test_root: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        runner: Arc<dyn TestRunner>,
        debugger: Arc<dyn TestRunner>,
    ) -> Self {
        Self {
            test_root: test_root.into(),
            output_path: output_path.into(),
            runner,
            debugger,
            in_flight: Mutex::new(None),
            generation: AtomicU64::new(0),
        }
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Resolve `ids` against `tree`.
    ///
    /// ## Notes
    /// - Repeated targets collapse to one.
    /// - A workspace target covers every other target, so it becomes the only one.
    /// - A file target covers the located targets in that file, which are dropped.
    pub fn plan<'t>(&self, tree: &'t TestNode, ids: &[String]) -> RunPlan<'t> {
        let mut plan = RunPlan {
            nodes: Vec::new(),
            targets: Vec::new(),
            unresolved: Vec::new(),
        };
        let mut seen = HashSet::new();

        for id in ids {
            let Some(node) = tree.find(id) else {
                tracing::warn!(error = %ExplorerError::UnresolvedNodeId(id.clone()), "skipping selection");
                plan.unresolved.push(id.clone());
                continue;
            };
            plan.nodes.push(node);
            let target = RunTarget::for_address(node.address(), &self.test_root);
            if seen.insert(target.clone()) {
                plan.targets.push(target);
            }
        }

        if let Some(workspace) = plan
            .targets
            .iter()
            .find(|t| matches!(t, RunTarget::Workspace(_)))
            .cloned()
        {
            plan.targets = vec![workspace];
            return plan;
        }

        let whole_files: HashSet<PathBuf> = plan
            .targets
            .iter()
            .filter_map(|t| match t {
                RunTarget::File(file) => Some(file.clone()),
                _ => None,
            })
            .collect();
        plan.targets
            .retain(|t| !matches!(t, RunTarget::Location { file, .. } if whole_files.contains(file)));
        plan
    }

    /// Resolve and execute `ids`.
    pub async fn dispatch(&self, tree: &TestNode, ids: &[String], mode: RunMode) -> ExplorerResult<DispatchSummary> {
        let plan = self.plan(tree, ids);
        let mut summary = self.execute(&plan.targets, mode).await?;
        summary.skipped = plan.unresolved;
        Ok(summary)
    }

    /// Execute already-resolved targets, one after another.
    #[tracing::instrument(skip_all, fields(targets = targets.len(), mode = ?mode))]
    pub async fn execute(&self, targets: &[RunTarget], mode: RunMode) -> ExplorerResult<DispatchSummary> {
        match mode {
            RunMode::Run => self.execute_cancellable(targets).await,
            RunMode::Debug => {
                self.cancel();
                let mut summary = DispatchSummary::default();
                for target in targets {
                    tracing::info!(%target, "debugging");
                    self.debugger
                        .execute(&target.invocation(mode, &self.output_path))
                        .await?;
                    summary.executed.push(target.clone());
                }
                Ok(summary)
            }
        }
    }

    async fn execute_cancellable(&self, targets: &[RunTarget]) -> ExplorerResult<DispatchSummary> {
        let (generation, mut cancelled_rx) = self.begin();
        let mut summary = DispatchSummary::default();
        let mut outcome = Ok(());

        for target in targets {
            tracing::info!(%target, "running");
            let invocation = target.invocation(RunMode::Run, &self.output_path);
            tokio::select! {
                biased;
                _ = &mut cancelled_rx => {
                    tracing::info!(generation, "run cancelled");
                    summary.cancelled = true;
                    break;
                }
                result = self.runner.execute(&invocation) => {
                    if let Err(err) = result {
                        outcome = Err(err);
                        break;
                    }
                    summary.executed.push(target.clone());
                }
            }
        }

        self.finish(generation);
        outcome.map(|()| summary)
    }

    /// Cancel the in-flight run, if any.
    ///
    /// ## Returns
    /// - (`bool`): whether a run was signalled.
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(in_flight) => {
                tracing::debug!(generation = in_flight.generation, "cancelling in-flight run");
                let _ = in_flight.cancel.send(());
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    fn begin(&self) -> (u64, oneshot::Receiver<()>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (cancel, cancelled_rx) = oneshot::channel();
        let previous = self.lock().replace(InFlight { generation, cancel });
        if let Some(previous) = previous {
            tracing::debug!(previous = previous.generation, generation, "superseding in-flight run");
            let _ = previous.cancel.send(());
        }
        (generation, cancelled_rx)
    }

    fn finish(&self, generation: u64) {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|in_flight| in_flight.generation == generation) {
            *slot = None;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<InFlight>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use async_trait::async_trait;
    use pester_tree::NodeAddress;
    use tokio::sync::Notify;

    use super::*;
    use crate::runner::RunInvocation;

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<RunInvocation>>,
        block_first: AtomicBool,
        started: Notify,
    }

    impl RecordingRunner {
        fn blocking_first() -> Self {
            let runner = Self::default();
            runner.block_first.store(true, Ordering::SeqCst);
            runner
        }

        fn calls(&self) -> Vec<RunInvocation> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TestRunner for RecordingRunner {
        async fn execute(&self, invocation: &RunInvocation) -> ExplorerResult<()> {
            self.calls.lock().unwrap().push(invocation.clone());
            if self.block_first.swap(false, Ordering::SeqCst) {
                self.started.notify_one();
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl TestRunner for FailingRunner {
        async fn execute(&self, _invocation: &RunInvocation) -> ExplorerResult<()> {
            Err(ExplorerError::MissingRunner("pwsh".into()))
        }
    }

    fn tree() -> TestNode {
        let file = "/ws/a.Tests.ps1";
        TestNode::root().with_child(
            TestNode::suite(file, "a.Tests.ps1").at(file, None).with_child(
                TestNode::suite(NodeAddress::located(file, 3).to_wire(), "Math")
                    .at(file, Some(2))
                    .with_child(TestNode::test(NodeAddress::located(file, 4).to_wire(), "adds").at(file, Some(3))),
            ),
        )
    }

    fn dispatcher(runner: Arc<dyn TestRunner>, debugger: Arc<dyn TestRunner>) -> RunDispatcher {
        RunDispatcher::new("/ws", "/ws/TestExplorerResults.xml", runner, debugger)
    }

    fn ids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[test]
    fn test_plan_root_is_single_workspace_target() {
        let runner = Arc::new(RecordingRunner::default());
        let d = dispatcher(runner.clone(), runner);
        let tree = tree();

        let plan = d.plan(&tree, &ids(&["/ws/a.Tests.ps1;4", "root", "/ws/a.Tests.ps1"]));

        assert_eq!(plan.nodes.len(), 3);
        assert_eq!(plan.targets, vec![RunTarget::Workspace(PathBuf::from("/ws"))]);
    }

    #[test]
    fn test_plan_collapses_duplicates_and_reports_unknown_ids() {
        let runner = Arc::new(RecordingRunner::default());
        let d = dispatcher(runner.clone(), runner);
        let tree = tree();

        let plan = d.plan(&tree, &ids(&["/ws/a.Tests.ps1;4", "/ws/gone.Tests.ps1;1", "/ws/a.Tests.ps1;4"]));

        assert_eq!(
            plan.targets,
            vec![RunTarget::Location {
                file: PathBuf::from("/ws/a.Tests.ps1"),
                line: 4
            }]
        );
        assert_eq!(plan.unresolved, ids(&["/ws/gone.Tests.ps1;1"]));
    }

    #[test]
    fn test_plan_file_target_covers_its_locations() {
        let runner = Arc::new(RecordingRunner::default());
        let d = dispatcher(runner.clone(), runner);
        let tree = tree();

        let plan = d.plan(&tree, &ids(&["/ws/a.Tests.ps1;4", "/ws/a.Tests.ps1", "/ws/a.Tests.ps1;3"]));

        assert_eq!(plan.nodes.len(), 3);
        assert_eq!(plan.targets, vec![RunTarget::File(PathBuf::from("/ws/a.Tests.ps1"))]);
    }

    #[tokio::test]
    async fn test_file_and_location_selection_runs_the_file_once() {
        let runner = Arc::new(RecordingRunner::default());
        let d = dispatcher(runner.clone(), runner.clone());

        let summary = d
            .dispatch(&tree(), &ids(&["/ws/a.Tests.ps1", "/ws/a.Tests.ps1;4"]), RunMode::Run)
            .await
            .unwrap();

        assert_eq!(summary.executed.len(), 1);
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target_path, PathBuf::from("/ws/a.Tests.ps1"));
        assert_eq!(calls[0].line, None);
    }

    #[tokio::test]
    async fn test_dispatch_passes_one_based_line() {
        let runner = Arc::new(RecordingRunner::default());
        let d = dispatcher(runner.clone(), Arc::new(FailingRunner));

        let summary = d
            .dispatch(&tree(), &ids(&["/ws/a.Tests.ps1;3"]), RunMode::Run)
            .await
            .unwrap();

        assert!(!summary.cancelled);
        assert_eq!(summary.executed.len(), 1);
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].line, Some(3));
        assert!(!calls[0].debug);
        assert_eq!(calls[0].output_path, PathBuf::from("/ws/TestExplorerResults.xml"));
        assert!(!d.is_running());
    }

    #[tokio::test]
    async fn test_unresolved_only_selection_runs_nothing() {
        let runner = Arc::new(RecordingRunner::default());
        let d = dispatcher(runner.clone(), runner.clone());

        let summary = d.dispatch(&tree(), &ids(&["nope"]), RunMode::Run).await.unwrap();

        assert!(summary.executed.is_empty());
        assert_eq!(summary.skipped, ids(&["nope"]));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_new_run_cancels_in_flight_run() {
        let runner = Arc::new(RecordingRunner::blocking_first());
        let d = Arc::new(dispatcher(runner.clone(), runner.clone()));
        let tree = Arc::new(tree());

        let first = tokio::spawn({
            let d = Arc::clone(&d);
            let tree = Arc::clone(&tree);
            async move { d.dispatch(&tree, &ids(&["root"]), RunMode::Run).await }
        });
        runner.started.notified().await;
        assert!(d.is_running());

        let second = d
            .dispatch(&tree, &ids(&["/ws/a.Tests.ps1;4"]), RunMode::Run)
            .await
            .unwrap();
        let first = first.await.unwrap().unwrap();

        assert!(first.cancelled);
        assert!(first.executed.is_empty());
        assert!(!second.cancelled);
        assert_eq!(second.executed.len(), 1);
        assert!(!d.is_running());
    }

    #[tokio::test]
    async fn test_explicit_cancel() {
        let runner = Arc::new(RecordingRunner::blocking_first());
        let d = Arc::new(dispatcher(runner.clone(), runner.clone()));
        let tree = Arc::new(tree());

        let run = tokio::spawn({
            let d = Arc::clone(&d);
            let tree = Arc::clone(&tree);
            async move { d.dispatch(&tree, &ids(&["root"]), RunMode::Run).await }
        });
        runner.started.notified().await;

        assert!(d.cancel());
        assert!(run.await.unwrap().unwrap().cancelled);
        assert!(!d.cancel());
    }

    #[tokio::test]
    async fn test_debug_uses_debugger() {
        let runner = Arc::new(RecordingRunner::default());
        let debugger = Arc::new(RecordingRunner::default());
        let d = dispatcher(runner.clone(), debugger.clone());

        d.dispatch(&tree(), &ids(&["/ws/a.Tests.ps1"]), RunMode::Debug).await.unwrap();

        assert!(runner.calls().is_empty());
        let calls = debugger.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].debug);
        assert_eq!(calls[0].line, None);
    }

    #[tokio::test]
    async fn test_runner_error_propagates() {
        let d = dispatcher(Arc::new(FailingRunner), Arc::new(FailingRunner));

        let err = d.dispatch(&tree(), &ids(&["root"]), RunMode::Run).await.unwrap_err();

        assert!(matches!(err, ExplorerError::MissingRunner(_)));
        assert!(!d.is_running());
    }
}
