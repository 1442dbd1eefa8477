/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::discovery::BinderPolicy;

/// Language identifier of Volo script documents.
pub const VOLO_LANGUAGE_ID: &str = "volo";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Profile forwarded to the server in `initializationOptions`.
    #[serde(default)]
    pub profile: Option<String>,

    /// Language identifier the session handles (default: "volo")
    #[serde(default = "default_language_id")]
    pub language_id: String,

    /// How binder schemas are discovered and passed to the server.
    #[serde(default)]
    pub binder_policy: BinderPolicy,

    /// Seconds to wait for the server to exit after `exit` (default: 5)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,

    /// Where the server and schemas live inside a workspace folder.
    #[serde(default)]
    pub layout: LayoutConfig,
}

/// Workspace-relative locations used during discovery.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct LayoutConfig {
    /// Server executable, without the platform suffix.
    pub server: PathBuf,
    /// Directory holding binder schemas.
    pub schemas: PathBuf,
    /// File-name prefix of scanned binder schemas.
    pub binder_prefix: String,
    /// File-name suffix of scanned binder schemas.
    pub binder_suffix: String,
    /// File name used by the single-binder policy.
    pub binder_file: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            server: PathBuf::from("bin").join("lsp"),
            schemas: PathBuf::from("assets").join("schemas"),
            binder_prefix: "script_".to_string(),
            binder_suffix: "_binder.json".to_string(),
            binder_file: "script_binder.json".to_string(),
        }
    }
}

impl LayoutConfig {
    /// Wildcard pattern matching scanned binder schemas, e.g. `script_*_binder.json`.
    #[must_use]
    pub fn binder_pattern(&self) -> String {
        format!("{}*{}", self.binder_prefix, self.binder_suffix)
    }
}

fn default_language_id() -> String {
    VOLO_LANGUAGE_ID.to_string()
}

fn default_shutdown_timeout() -> u64 {
    5
}

impl Default for Config {
    fn default() -> Self {
        Self {
            profile: None,
            language_id: default_language_id(),
            binder_policy: BinderPolicy::default(),
            shutdown_timeout: default_shutdown_timeout(),
            layout: LayoutConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from standard paths or a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source cannot be read or does not
    /// deserialize into [`Config`].
    pub fn load(explicit_file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // 1. Start with defaults
        builder = builder
            .set_default("language_id", VOLO_LANGUAGE_ID)?
            .set_default("shutdown_timeout", default_shutdown_timeout())?;

        // 2. Load from user config directory (~/.config/volo-session/config.toml)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("volo-session").join("config.toml");
            if config_path.exists() {
                builder = builder.add_source(config::File::from(config_path));
            }
        }

        // 3. Load from explicit file if provided
        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path));
        }

        // 4. Load from environment variables (VOLO_SESSION_PROFILE, VOLO_SESSION_LAYOUT__SERVER, etc.)
        builder = builder.add_source(
            config::Environment::with_prefix("VOLO_SESSION")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Shutdown timeout as a [`Duration`].
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.profile, None);
        assert_eq!(config.language_id, "volo");
        assert_eq!(config.binder_policy, BinderPolicy::Scan);
        assert_eq!(config.shutdown_timeout(), Duration::from_secs(5));
        assert_eq!(config.layout.server, PathBuf::from("bin/lsp"));
        assert_eq!(config.layout.schemas, PathBuf::from("assets/schemas"));
    }

    #[test]
    fn test_binder_pattern() {
        assert_eq!(
            LayoutConfig::default().binder_pattern(),
            "script_*_binder.json"
        );
    }

    #[test]
    fn test_partial_layout_keeps_defaults() -> Result<()> {
        let layout: LayoutConfig = serde_json::from_str(r#"{"server":"tools/volo-lsp"}"#)?;
        assert_eq!(layout.server, PathBuf::from("tools/volo-lsp"));
        assert_eq!(layout.binder_prefix, "script_");
        assert_eq!(layout.binder_file, "script_binder.json");
        Ok(())
    }
}
