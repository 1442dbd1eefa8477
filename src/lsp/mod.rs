// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// Low-level LSP client for communicating with the server process.
pub mod client;
/// LSP message protocol definitions.
pub mod protocol;
/// Document selector restricting the session to one language.
pub mod selector;
/// Session lifecycle state.
pub mod state;

pub use client::LspClient;
pub use selector::{DocumentSelector, language_id_for_path};
pub use state::{SessionState, SessionStatus};
