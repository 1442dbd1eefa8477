// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Errors raised while bootstrapping a session.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`crate::SessionController::activate`].
///
/// Binder discovery never produces an error: a workspace without schemas
/// simply starts a session without host-API bindings.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// No workspace folder contains a server executable.
    #[error("Volo language server not found; searched: {}", display_paths(.searched))]
    MissingServerBinary {
        /// Every candidate path that was checked, in precedence order.
        searched: Vec<PathBuf>,
    },

    /// The resolved executable could not be started.
    #[error("failed to start language server {}: {source}", .path.display())]
    Spawn {
        /// Executable that was launched.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },

    /// The configured binder naming convention does not compile.
    #[error("invalid binder file pattern: {0}")]
    BinderPattern(#[from] regex::Error),

    /// `activate` was called while a session is still live.
    #[error("a language server session is already active")]
    AlreadyActive,
}

fn display_paths(paths: &[PathBuf]) -> String {
    if paths.is_empty() {
        return "(no workspace folders)".to_string();
    }
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_binary_lists_searched_paths() {
        let err = BootstrapError::MissingServerBinary {
            searched: vec![PathBuf::from("/a/bin/lsp"), PathBuf::from("/b/bin/lsp")],
        };
        assert_eq!(
            err.to_string(),
            "Volo language server not found; searched: /a/bin/lsp, /b/bin/lsp"
        );
    }

    #[test]
    fn test_missing_binary_without_folders() {
        let err = BootstrapError::MissingServerBinary { searched: vec![] };
        assert!(err.to_string().ends_with("(no workspace folders)"));
    }
}
