//! Pester explorer server binary entry point
//!
//! Run with: pester-explorer-lsp
//!
//! The server communicates via stdin/stdout using JSON-RPC; logs go to stderr.

use tower_lsp::Server;

#[tokio::main]
async fn main() {
    // Stdout carries the protocol, so logging must stay on stderr
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = pester_explorer::lsp::service();

    Server::new(stdin, stdout, socket).serve(service).await;
}
