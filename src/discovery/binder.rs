// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Discovers binder schemas describing host APIs available to scripts.
//!
//! Every policy checks that the schema directory exists before touching it;
//! a missing or unreadable directory means "no binders", never an error.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::LayoutConfig;
use crate::workspace::WorkspaceFolder;

/// How binder schemas are found and handed to the server.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BinderPolicy {
    /// Never pass binder information.
    None,
    /// First folder containing the fixed binder file wins (`--binder`).
    Single,
    /// Every schema matching the naming convention, across all folders (`--binders`).
    #[default]
    Scan,
    /// One wildcard pattern per folder with a schema directory (`--binders`).
    Glob,
}

/// Result of binder discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "paths")]
pub enum Binders {
    /// Nothing found; the server runs without host-API knowledge.
    None,
    /// A single schema file.
    Single(PathBuf),
    /// One or more schema files or wildcard patterns, in discovery order.
    Many(Vec<PathBuf>),
}

impl Binders {
    /// Wraps a list, collapsing an empty one to [`Binders::None`].
    #[must_use]
    pub fn many(paths: Vec<PathBuf>) -> Self {
        if paths.is_empty() {
            Self::None
        } else {
            Self::Many(paths)
        }
    }

    /// Returns true if nothing was found.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::None)
    }

    /// All discovered paths in discovery order.
    #[must_use]
    pub fn paths(&self) -> &[PathBuf] {
        match self {
            Self::None => &[],
            Self::Single(path) => std::slice::from_ref(path),
            Self::Many(paths) => paths.as_slice(),
        }
    }
}

/// File-name matcher for `<prefix>*<suffix>` conventions.
#[derive(Debug, Clone)]
pub struct BinderPattern {
    glob: String,
    regex: Regex,
}

impl BinderPattern {
    /// Compiles a wildcard pattern where `*` matches any run of characters.
    ///
    /// # Errors
    ///
    /// Returns an error if the resulting expression exceeds the regex size limit.
    pub fn new(glob: &str) -> Result<Self, regex::Error> {
        let body = glob
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{body}$"))?;
        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    /// Returns true if `name` follows the convention.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    /// The wildcard pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.glob
    }
}

/// Finds binder schemas under each folder's schema directory.
#[derive(Debug, Clone)]
pub struct BinderLocator {
    policy: BinderPolicy,
    schemas: PathBuf,
    file: String,
    pattern: BinderPattern,
}

impl BinderLocator {
    /// Creates a locator from the workspace layout.
    ///
    /// # Errors
    ///
    /// Returns an error if the binder naming convention cannot be compiled.
    pub fn new(policy: BinderPolicy, layout: &LayoutConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            policy,
            schemas: layout.schemas.clone(),
            file: layout.binder_file.clone(),
            pattern: BinderPattern::new(&layout.binder_pattern())?,
        })
    }

    /// Runs discovery across `folders` according to the policy.
    #[must_use]
    pub fn locate(&self, folders: &[WorkspaceFolder]) -> Binders {
        let binders = match self.policy {
            BinderPolicy::None => Binders::None,
            BinderPolicy::Single => self.locate_single(folders),
            BinderPolicy::Scan => Binders::many(
                folders
                    .iter()
                    .flat_map(|folder| self.scan_folder(folder.path()))
                    .collect(),
            ),
            BinderPolicy::Glob => Binders::many(
                folders
                    .iter()
                    .filter_map(|folder| self.schema_dir(folder.path()))
                    .map(|dir| dir.join(self.pattern.as_str()))
                    .collect(),
            ),
        };

        if binders.is_empty() {
            debug!("No binder schemas found ({:?} policy)", self.policy);
        } else {
            debug!(
                "Found {} binder schema(s) ({:?} policy)",
                binders.paths().len(),
                self.policy
            );
        }
        binders
    }

    fn locate_single(&self, folders: &[WorkspaceFolder]) -> Binders {
        folders
            .iter()
            .filter_map(|folder| self.schema_dir(folder.path()))
            .map(|dir| dir.join(&self.file))
            .find(|path| path.is_file())
            .map_or(Binders::None, Binders::Single)
    }

    /// Lists matching schemas of one folder, sorted by file name.
    fn scan_folder(&self, folder: &Path) -> Vec<PathBuf> {
        let Some(dir) = self.schema_dir(folder) else {
            return Vec::new();
        };

        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Failed to read schema directory {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut found: Vec<PathBuf> = entries
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry.path()),
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    None
                }
            })
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| self.pattern.matches(name))
            })
            .filter(|path| path.is_file())
            .collect();
        found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        found
    }

    /// Returns the schema directory of `folder` if it exists.
    fn schema_dir(&self, folder: &Path) -> Option<PathBuf> {
        let dir = folder.join(&self.schemas);
        if dir.is_dir() {
            Some(dir)
        } else {
            debug!("No schema directory at {}", dir.display());
            None
        }
    }
}
