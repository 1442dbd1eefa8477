// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Session bootstrapper for the Volo script language server.
//!
//! Finds the language server that ships inside a Volo workspace, discovers
//! the binder schemas describing the host APIs scripts can call, and runs a
//! single LSP client session against that server over stdio.

/// Terminal output helpers for the command-line host.
pub mod cli;
/// Configuration loading and workspace layout.
pub mod config;
/// Server executable and binder schema discovery.
pub mod discovery;
/// Error types.
pub mod error;
/// Server process specification and argument assembly.
pub mod launch;
/// LSP client implementation.
pub mod lsp;
/// Session lifecycle control.
pub mod session;
/// Workspace folders.
pub mod workspace;

pub use config::Config;
pub use error::BootstrapError;
pub use launch::ServerProcessSpec;
pub use session::{Discovery, SessionController};
pub use workspace::WorkspaceFolder;
