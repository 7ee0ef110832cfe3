//! Pester Explorer version information.
//!
//! This module exposes the version as a single constant so the CLI, the language server's
//! `serverInfo` and log lines agree on the same value.
//!
//! ## Notes
//!
//! - The value is taken from Cargo metadata (`CARGO_PKG_VERSION`) at compile time.
//! - Prefer this constant over repeating `env!("CARGO_PKG_VERSION")` in multiple places.

/// The Pester Explorer version string (for example, `0.1.0-alpha.1`).
pub const PESTER_EXPLORER_VERSION: &str = env!("CARGO_PKG_VERSION");
