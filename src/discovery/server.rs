// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Locates the workspace-provided language server executable.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::workspace::WorkspaceFolder;

/// Finds the server executable inside the workspace folders.
///
/// Precedence: folders are checked in the order the host reports them and,
/// within a folder, the bare name is preferred over the platform-suffixed
/// one. The first candidate that exists as a regular file wins, so the
/// suffixed name is only used when the bare name is absent.
#[derive(Debug, Clone)]
pub struct ServerLocator {
    relative: PathBuf,
    exe_suffix: String,
}

impl ServerLocator {
    /// Creates a locator for the given folder-relative path, using the host
    /// platform's executable suffix.
    pub fn new(relative: impl Into<PathBuf>) -> Self {
        Self::with_suffix(relative, std::env::consts::EXE_SUFFIX)
    }

    /// Creates a locator with an explicit executable suffix (e.g. `.exe`).
    pub fn with_suffix(relative: impl Into<PathBuf>, exe_suffix: impl Into<String>) -> Self {
        Self {
            relative: relative.into(),
            exe_suffix: exe_suffix.into(),
        }
    }

    /// Returns every candidate path in precedence order.
    #[must_use]
    pub fn candidates(&self, folders: &[WorkspaceFolder]) -> Vec<PathBuf> {
        folders
            .iter()
            .flat_map(|folder| {
                let bare = folder.path().join(&self.relative);
                let suffixed = self.suffixed(&bare);
                std::iter::once(bare).chain(suffixed)
            })
            .collect()
    }

    /// Returns the first existing candidate, or `None` if no folder has one.
    #[must_use]
    pub fn locate(&self, folders: &[WorkspaceFolder]) -> Option<PathBuf> {
        let found = self
            .candidates(folders)
            .into_iter()
            .find(|candidate| candidate.is_file());

        match &found {
            Some(path) => debug!("Resolved language server: {}", path.display()),
            None => debug!("No language server in {} folder(s)", folders.len()),
        }
        found
    }

    fn suffixed(&self, bare: &Path) -> Option<PathBuf> {
        if self.exe_suffix.is_empty() {
            return None;
        }
        let mut name: OsString = bare.file_name()?.to_os_string();
        name.push(&self.exe_suffix);
        Some(bare.with_file_name(name))
    }
}
