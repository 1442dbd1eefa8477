// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Server command-line assembly.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::discovery::Binders;

/// Flag carrying a single binder schema.
pub const BINDER_FLAG: &str = "--binder";
/// Flag carrying one or more binder schemas or patterns.
pub const BINDERS_FLAG: &str = "--binders";

/// Channel used to talk to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// LSP over the child's stdin/stdout.
    Stdio,
}

impl Transport {
    /// Flag that tells the server which transport to use.
    #[must_use]
    pub const fn flag(self) -> &'static str {
        match self {
            Self::Stdio => "--stdio",
        }
    }
}

/// Everything needed to launch the server process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerProcessSpec {
    /// Resolved executable.
    pub command: PathBuf,
    /// Transport kind.
    pub transport: Transport,
    /// Arguments, excluding the transport flag.
    pub args: Vec<String>,
}

impl ServerProcessSpec {
    /// Builds a stdio spec for `command` with the binder arguments appended.
    pub fn stdio(command: impl Into<PathBuf>, binders: &Binders) -> Self {
        Self {
            command: command.into(),
            transport: Transport::Stdio,
            args: binder_args(binders),
        }
    }

    /// Arguments passed to the process: the transport flag, then `args`.
    #[must_use]
    pub fn process_args(&self) -> Vec<String> {
        std::iter::once(self.transport.flag().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Shell-like rendering for logs and diagnostics output.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.command.display().to_string())
            .chain(self.process_args())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Turns discovery results into server arguments.
///
/// Nothing is emitted when no binder was found, leaving the server on its
/// defaults.
#[must_use]
pub fn binder_args(binders: &Binders) -> Vec<String> {
    match binders {
        Binders::None => Vec::new(),
        Binders::Single(path) => vec![BINDER_FLAG.to_string(), path_arg(path)],
        Binders::Many(paths) if paths.is_empty() => Vec::new(),
        Binders::Many(paths) => std::iter::once(BINDERS_FLAG.to_string())
            .chain(paths.iter().map(|p| path_arg(p)))
            .collect(),
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_binders_no_flag() {
        let spec = ServerProcessSpec::stdio("/ws/bin/lsp", &Binders::None);
        assert_eq!(spec.command, PathBuf::from("/ws/bin/lsp"));
        assert!(spec.args.is_empty());
        assert_eq!(spec.process_args(), vec!["--stdio"]);
    }

    #[test]
    fn test_empty_many_is_omitted() {
        assert!(binder_args(&Binders::Many(vec![])).is_empty());
    }

    #[test]
    fn test_single_binder_flag() {
        let args = binder_args(&Binders::Single(PathBuf::from(
            "/ws/assets/schemas/script_binder.json",
        )));
        assert_eq!(
            args,
            vec!["--binder", "/ws/assets/schemas/script_binder.json"]
        );
    }

    #[test]
    fn test_many_binders_keep_order() {
        let args = binder_args(&Binders::Many(vec![
            PathBuf::from("/ws/assets/schemas/script_b_binder.json"),
            PathBuf::from("/ws/assets/schemas/script_a_binder.json"),
        ]));
        assert_eq!(
            args,
            vec![
                "--binders",
                "/ws/assets/schemas/script_b_binder.json",
                "/ws/assets/schemas/script_a_binder.json",
            ]
        );
    }

    #[test]
    fn test_command_line_rendering() {
        let spec = ServerProcessSpec::stdio(
            "/ws/bin/lsp",
            &Binders::Many(vec![PathBuf::from("/ws/assets/schemas/script_*_binder.json")]),
        );
        assert_eq!(
            spec.command_line(),
            "/ws/bin/lsp --stdio --binders /ws/assets/schemas/script_*_binder.json"
        );
    }
}
