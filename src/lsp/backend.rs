//! JSON-RPC backend for the Pester explorer

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use pester_tree::TestNode;
use tokio::sync::RwLock;
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use super::protocol::{
    DebugTests, DebugTestsParams, InitializationOptions, ResultsChangedParams, Retire, RunParams, RunResponse,
    TestStatesEvent, TestsEvent,
};
use crate::adapter::{PesterAdapter, ResultSubscription};
use crate::config::ExplorerConfig;
use crate::discovery::PwshDiscovery;
use crate::error::{ExplorerError, ExplorerResult};
use crate::events::ExplorerEvent;
use crate::powershell::locate_powershell;
use crate::runner::{PwshRunner, RunInvocation, TestRunner};
use crate::version::PESTER_EXPLORER_VERSION;

/// Result-change notifications buffered before the pump catches up.
const RESULT_QUEUE_CAPACITY: usize = 16;

/// Debug sessions are handed back to the editor, which owns the debugger.
pub struct ClientDebugger {
    client: Client,
}

impl ClientDebugger {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TestRunner for ClientDebugger {
    async fn execute(&self, invocation: &RunInvocation) -> ExplorerResult<()> {
        self.client
            .send_request::<DebugTests>(DebugTestsParams::from(invocation))
            .await
            .map_err(|err| ExplorerError::Runner(format!("client debug session failed: {}", err.message)))
    }
}

/// Pester explorer server
pub struct PesterLanguageServer {
    client: Client,
    session: Arc<RwLock<Option<Arc<PesterAdapter>>>>,
    results: Arc<RwLock<Option<ResultSubscription>>>,
    startup_error: Arc<RwLock<Option<String>>>,
}

impl PesterLanguageServer {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            session: Arc::new(RwLock::new(None)),
            results: Arc::new(RwLock::new(None)),
            startup_error: Arc::new(RwLock::new(None)),
        }
    }

    async fn session(&self) -> Result<Arc<PesterAdapter>> {
        if let Some(adapter) = self.session.read().await.as_ref() {
            return Ok(Arc::clone(adapter));
        }
        let mut err = Error::invalid_request();
        if let Some(reason) = self.startup_error.read().await.as_ref() {
            err.message = format!("explorer session unavailable: {reason}").into();
        }
        Err(err)
    }

    fn open_session(&self, config: ExplorerConfig) -> ExplorerResult<PesterAdapter> {
        let powershell = locate_powershell(config.powershell_path.as_deref())?;
        tracing::info!(powershell = %powershell.display(), "using PowerShell");
        Ok(PesterAdapter::new(
            config,
            Arc::new(PwshDiscovery::new(&powershell)),
            Arc::new(PwshRunner::new(&powershell)),
            Arc::new(ClientDebugger::new(self.client.clone())),
        ))
    }

    /// `pester/load`
    pub async fn load(&self) -> Result<TestNode> {
        let adapter = self.session().await?;
        let tree = adapter.load().await.map_err(rpc_error)?;
        Ok((*tree).clone())
    }

    /// `pester/run`
    pub async fn run(&self, params: RunParams) -> Result<RunResponse> {
        let adapter = self.session().await?;
        adapter.run(&params.tests).await.map(RunResponse::from).map_err(rpc_error)
    }

    /// `pester/debug`
    pub async fn debug(&self, params: RunParams) -> Result<RunResponse> {
        let adapter = self.session().await?;
        adapter.debug(&params.tests).await.map(RunResponse::from).map_err(rpc_error)
    }

    /// `pester/cancel`
    pub async fn cancel(&self) -> Result<bool> {
        Ok(self.session().await?.cancel())
    }

    /// `pester/resultsChanged`
    pub async fn results_changed(&self, params: ResultsChangedParams) -> Result<usize> {
        let adapter = self.session().await?;
        adapter.results_changed(&params.path).await.map_err(rpc_error)
    }

    async fn register_watchers(&self, config: &ExplorerConfig) {
        let watchers = vec![
            FileSystemWatcher {
                glob_pattern: "**/*.[tT]ests.ps1".to_string(),
                kind: None,
            },
            FileSystemWatcher {
                glob_pattern: format!("**/{}", config.result_file_name),
                kind: None,
            },
        ];
        let registration = Registration {
            id: "pester-explorer-watchers".to_string(),
            method: "workspace/didChangeWatchedFiles".to_string(),
            register_options: serde_json::to_value(DidChangeWatchedFilesRegistrationOptions { watchers }).ok(),
        };
        if let Err(err) = self.client.register_capability(vec![registration]).await {
            tracing::warn!(error = %err.message, "client refused file watchers");
        }
    }
}

fn rpc_error(err: ExplorerError) -> Error {
    let mut rpc = Error::internal_error();
    rpc.message = err.to_string().into();
    rpc
}

fn workspace_root(params: &InitializeParams) -> Option<PathBuf> {
    #[allow(deprecated)]
    let root_uri = params.root_uri.as_ref();
    root_uri
        .or_else(|| {
            params
                .workspace_folders
                .as_ref()
                .and_then(|folders| folders.first())
                .map(|folder| &folder.uri)
        })
        .and_then(|uri| uri.to_file_path().ok())
}

/// Session configuration for `root` from the environment and the client's options.
pub fn session_config(root: &Path, options: Option<serde_json::Value>) -> ExplorerConfig {
    let options = options
        .map(|value| {
            serde_json::from_value::<InitializationOptions>(value).unwrap_or_else(|err| {
                tracing::warn!(error = %err, "ignoring malformed initializationOptions");
                InitializationOptions::default()
            })
        })
        .unwrap_or_default();

    let mut config = ExplorerConfig::from_env(root).with_auto_discover_on_open(options.auto_discover_on_open);
    if let Some(test_root) = options.test_root {
        config = config.with_test_root(test_root);
    }
    if let Some(path) = options.powershell_path {
        config = config.with_powershell_path(path);
    }
    if let Some(name) = options.result_file_name {
        config = config.with_result_file_name(name);
    }
    config
}

async fn forward(client: &Client, event: ExplorerEvent) {
    match event {
        ExplorerEvent::Load(event) => client.send_notification::<TestsEvent>(event).await,
        ExplorerEvent::Run(event) => client.send_notification::<TestStatesEvent>(event).await,
        ExplorerEvent::Retire(event) => client.send_notification::<Retire>(event).await,
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for PesterLanguageServer {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        match workspace_root(&params) {
            Some(root) => {
                let config = session_config(&root, params.initialization_options.clone());
                match self.open_session(config) {
                    Ok(adapter) => *self.session.write().await = Some(Arc::new(adapter)),
                    Err(err) => {
                        tracing::error!(error = %err, "cannot start explorer session");
                        *self.startup_error.write().await = Some(err.to_string());
                    }
                }
            }
            None => {
                *self.startup_error.write().await = Some("no workspace folder".to_string());
            }
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities::default(),
            server_info: Some(ServerInfo {
                name: "pester-explorer-lsp".to_string(),
                version: Some(PESTER_EXPLORER_VERSION.to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        if let Some(reason) = self.startup_error.read().await.clone() {
            self.client
                .show_message(MessageType::ERROR, format!("Pester explorer disabled: {reason}"))
                .await;
            return;
        }
        let Ok(adapter) = self.session().await else {
            return;
        };

        let mut events = adapter.subscribe();
        let client = self.client.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                forward(&client, event).await;
            }
        });

        let (subscription, pump) = Arc::clone(&adapter).watch_results(RESULT_QUEUE_CAPACITY);
        tokio::spawn(pump);
        *self.results.write().await = Some(subscription);

        self.register_watchers(adapter.config()).await;
        self.client
            .log_message(MessageType::INFO, "Pester explorer initialized")
            .await;

        if adapter.config().auto_discover_on_open {
            tokio::spawn(async move {
                if let Err(err) = adapter.load().await {
                    tracing::warn!(error = %err, "initial discovery failed");
                }
            });
        }
    }

    async fn shutdown(&self) -> Result<()> {
        if let Some(adapter) = self.session.read().await.as_ref() {
            adapter.cancel();
        }
        Ok(())
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let Ok(adapter) = self.session().await else {
            return;
        };

        let mut changed_scripts = Vec::new();
        let mut reload_all = false;
        for change in params.changes {
            let Ok(path) = change.uri.to_file_path() else {
                continue;
            };
            if path.file_name().and_then(|n| n.to_str()) == Some(adapter.config().result_file_name.as_str()) {
                if let Some(results) = self.results.read().await.as_ref() {
                    results.notify(path).await;
                }
            } else if adapter.config().is_test_file(&path) {
                if change.typ == FileChangeType::DELETED {
                    reload_all = true;
                } else {
                    changed_scripts.push(path);
                }
            }
        }

        if reload_all {
            if let Err(err) = adapter.load().await {
                tracing::warn!(error = %err, "reload after delete failed");
            }
        } else if !changed_scripts.is_empty() {
            if let Err(err) = adapter.reload(&changed_scripts).await {
                tracing::warn!(error = %err, "reload of changed scripts failed");
            }
        }
    }
}
