//! Events published to the UI, and the channel that fans them out.
//!
//! Event payloads serialize to the shapes the Test Explorer protocol expects, e.g.
//! `{"type":"started"}` or `{"type":"test","test":"<id>","state":"passed"}`. [`ExplorerEvent`]
//! adds a `channel` field naming the notification the payload travels on.

use std::sync::{Mutex, PoisonError};

use pester_tree::{StateChange, SuiteState, TestNode, TestState};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Discovery lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TestLoadEvent {
    Started,
    Finished {
        #[serde(skip_serializing_if = "Option::is_none")]
        suite: Option<TestNode>,
        #[serde(rename = "errorMessage", skip_serializing_if = "Option::is_none")]
        error_message: Option<String>,
    },
}

/// Run lifecycle and per-node state changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TestRunEvent {
    Started {
        tests: Vec<String>,
    },
    Suite {
        suite: String,
        state: SuiteState,
    },
    Test {
        test: String,
        state: TestState,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Finished,
}

impl From<StateChange> for TestRunEvent {
    fn from(change: StateChange) -> Self {
        match change {
            StateChange::Suite { id, state } => TestRunEvent::Suite { suite: id, state },
            StateChange::Test { id, state, message } => TestRunEvent::Test {
                test: id,
                state,
                message,
            },
        }
    }
}

/// Previously reported states for these ids are outdated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetireEvent {
    pub tests: Vec<String>,
}

/// Any event, tagged with the notification channel it belongs to.
///
/// Serializes flat, e.g. `{"channel":"testStates","type":"finished"}`, so a JSON-lines consumer
/// can tell a load `finished` from a run `finished`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "channel")]
pub enum ExplorerEvent {
    #[serde(rename = "tests")]
    Load(TestLoadEvent),
    #[serde(rename = "testStates")]
    Run(TestRunEvent),
    #[serde(rename = "retire")]
    Retire(RetireEvent),
}

impl From<TestLoadEvent> for ExplorerEvent {
    fn from(event: TestLoadEvent) -> Self {
        ExplorerEvent::Load(event)
    }
}

impl From<TestRunEvent> for ExplorerEvent {
    fn from(event: TestRunEvent) -> Self {
        ExplorerEvent::Run(event)
    }
}

impl From<RetireEvent> for ExplorerEvent {
    fn from(event: RetireEvent) -> Self {
        ExplorerEvent::Retire(event)
    }
}

/// Multi-subscriber event publisher.
///
/// ## Notes
/// - Emission never blocks: every subscriber gets an unbounded queue.
/// - Each subscriber sees events in emission order.
/// - Subscribers that dropped their receiver are pruned on the next emit.
#[derive(Debug, Default)]
pub struct EventChannel {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ExplorerEvent>>>,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ExplorerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().push(tx);
        rx
    }

    pub fn emit(&self, event: impl Into<ExplorerEvent>) {
        let event = event.into();
        let mut subscribers = self.lock();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        tracing::trace!(subscribers = subscribers.len(), ?event, "emitted event");
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<mpsc::UnboundedSender<ExplorerEvent>>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
