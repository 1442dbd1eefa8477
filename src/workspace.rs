// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Workspace folders supplied by the host.

use anyhow::{Result, anyhow};
use lsp_types::Uri;
use std::path::{Path, PathBuf};

/// A root directory of the open project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceFolder {
    path: PathBuf,
    name: String,
}

impl WorkspaceFolder {
    /// Creates a folder; the display name is the last path component.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "workspace".to_string());
        Self { path, name }
    }

    /// Filesystem path of the folder.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Display name of the folder.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `file://` URI of the folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is relative or cannot be expressed as a URI.
    pub fn uri(&self) -> Result<Uri> {
        path_to_uri(&self.path)
    }

    /// Converts into the LSP representation sent during `initialize`.
    ///
    /// # Errors
    ///
    /// Returns an error if the folder path cannot be expressed as a URI.
    pub fn to_lsp(&self) -> Result<lsp_types::WorkspaceFolder> {
        Ok(lsp_types::WorkspaceFolder {
            uri: self.uri()?,
            name: self.name.clone(),
        })
    }
}

/// Converts an absolute filesystem path into a `file://` URI.
///
/// # Errors
///
/// Returns an error if the path is relative.
pub fn path_to_uri(path: &Path) -> Result<Uri> {
    let url = url::Url::from_file_path(path)
        .map_err(|()| anyhow!("Path is not absolute: {}", path.display()))?;
    url.as_str()
        .parse()
        .map_err(|e| anyhow!("Invalid URI for {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_from_last_component() {
        let folder = WorkspaceFolder::new("/home/dev/game");
        assert_eq!(folder.name(), "game");
        assert_eq!(folder.path(), Path::new("/home/dev/game"));
    }

    #[test]
    fn test_root_falls_back_to_workspace_name() {
        assert_eq!(WorkspaceFolder::new("/").name(), "workspace");
    }

    #[cfg(unix)]
    #[test]
    fn test_to_lsp_uses_file_uri() -> Result<()> {
        let folder = WorkspaceFolder::new("/ws/my game").to_lsp()?;
        assert_eq!(folder.uri.as_str(), "file:///ws/my%20game");
        assert_eq!(folder.name, "my game");
        Ok(())
    }

    #[test]
    fn test_relative_path_is_rejected() {
        assert!(WorkspaceFolder::new("relative/dir").uri().is_err());
    }
}
