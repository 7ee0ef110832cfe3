//! JSON-RPC server exposing an explorer session to an editor
//!
//! Provides:
//! - Requests: `pester/load`, `pester/run`, `pester/debug`, `pester/cancel`, `pester/resultsChanged`
//! - Notifications: `pester/testsEvent`, `pester/testStatesEvent`, `pester/retire`
//! - Debugging through the editor via the `pester/debugTests` client request

pub mod backend;
pub mod protocol;

use tower_lsp::{ClientSocket, LspService};

pub use backend::{ClientDebugger, PesterLanguageServer};

/// Build the service with the explorer's custom methods registered.
pub fn service() -> (LspService<PesterLanguageServer>, ClientSocket) {
    LspService::build(PesterLanguageServer::new)
        .custom_method(protocol::LOAD_METHOD, PesterLanguageServer::load)
        .custom_method(protocol::RUN_METHOD, PesterLanguageServer::run)
        .custom_method(protocol::DEBUG_METHOD, PesterLanguageServer::debug)
        .custom_method(protocol::CANCEL_METHOD, PesterLanguageServer::cancel)
        .custom_method(protocol::RESULTS_CHANGED_METHOD, PesterLanguageServer::results_changed)
        .finish()
}
