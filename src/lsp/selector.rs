// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Restricts a session to documents of one language.

use std::path::Path;

use crate::config::VOLO_LANGUAGE_ID;

/// Accepts documents whose language identifier matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSelector {
    language_id: String,
}

impl DocumentSelector {
    /// Creates a selector for `language_id`.
    pub fn new(language_id: impl Into<String>) -> Self {
        Self {
            language_id: language_id.into(),
        }
    }

    /// The accepted language identifier.
    #[must_use]
    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    /// Returns true if documents tagged `language_id` belong to this session.
    #[must_use]
    pub fn matches(&self, language_id: &str) -> bool {
        self.language_id == language_id
    }
}

/// Maps a file to its language identifier by extension.
#[must_use]
pub fn language_id_for_path(path: &Path) -> Option<&'static str> {
    match path.extension()?.to_str()? {
        "script" => Some(VOLO_LANGUAGE_ID),
        "json" => Some("json"),
        "toml" => Some("toml"),
        _ => None,
    }
}
