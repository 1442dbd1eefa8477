// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
//! Integration tests for configuration loading and merging.
//!
//! Verifies that volo-session picks up settings from the user config
//! directory, an explicit file, environment variables, and CLI arguments in
//! the correct priority order. Results are observed through `doctor`.

use std::path::Path;
use std::process::{Command, Output, Stdio};

use anyhow::{Context, Result};
use tempfile::{TempDir, tempdir};

struct Doctor {
    cmd: Command,
}

impl Doctor {
    /// `doctor` against `folder` with user-level config rooted at `home`.
    fn new(home: &Path, folder: &Path) -> Self {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_volo-session"));
        cmd.arg("doctor").arg("--nocolor").arg("--folder").arg(folder);
        // Isolate from user-level config and the caller's environment
        cmd.env("XDG_CONFIG_HOME", home)
            .env_remove("VOLO_SESSION_PROFILE")
            .env_remove("VOLO_SESSION_BINDER_POLICY")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        Self { cmd }
    }

    fn arg(mut self, arg: impl AsRef<std::ffi::OsStr>) -> Self {
        self.cmd.arg(arg);
        self
    }

    fn env(mut self, key: &str, value: &str) -> Self {
        self.cmd.env(key, value);
        self
    }

    fn stdout(mut self) -> Result<String> {
        let output: Output = self.cmd.output().context("Failed to run volo-session")?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        anyhow::ensure!(
            output.status.success(),
            "doctor failed: {}\n{}",
            stdout,
            String::from_utf8_lossy(&output.stderr)
        );
        Ok(stdout)
    }
}

fn workspace(server: &str, schemas: &[&str]) -> Result<TempDir> {
    let dir = tempdir()?;
    let server = dir.path().join(server);
    if let Some(parent) = server.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&server, b"")?;

    let schema_dir = dir.path().join("assets/schemas");
    std::fs::create_dir_all(&schema_dir)?;
    for name in schemas {
        std::fs::write(schema_dir.join(name), b"{}")?;
    }
    Ok(dir)
}

fn write_config(path: &Path, table: &toml::Table) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string(table)?)?;
    Ok(())
}

fn profile_table(profile: &str) -> toml::Table {
    let mut table = toml::Table::new();
    table.insert("profile".into(), toml::Value::String(profile.into()));
    table
}

#[test]
fn test_user_config_sets_profile() -> Result<()> {
    let ws = workspace("bin/lsp", &[])?;
    let home = tempdir()?;
    write_config(
        &home.path().join("volo-session/config.toml"),
        &profile_table("release"),
    )?;

    let stdout = Doctor::new(home.path(), ws.path()).stdout()?;
    assert!(stdout.contains("Profile: release"), "{stdout}");
    Ok(())
}

#[test]
fn test_explicit_file_overrides_user_config() -> Result<()> {
    let ws = workspace("bin/lsp", &[])?;
    let home = tempdir()?;
    write_config(
        &home.path().join("volo-session/config.toml"),
        &profile_table("release"),
    )?;
    let explicit = home.path().join("explicit.toml");
    write_config(&explicit, &profile_table("staging"))?;

    let stdout = Doctor::new(home.path(), ws.path())
        .arg("--config")
        .arg(&explicit)
        .stdout()?;
    assert!(stdout.contains("Profile: staging"), "{stdout}");
    Ok(())
}

#[test]
fn test_env_overrides_file() -> Result<()> {
    let ws = workspace("bin/lsp", &[])?;
    let home = tempdir()?;
    let explicit = home.path().join("explicit.toml");
    write_config(&explicit, &profile_table("staging"))?;

    let stdout = Doctor::new(home.path(), ws.path())
        .arg("--config")
        .arg(&explicit)
        .env("VOLO_SESSION_PROFILE", "from-env")
        .stdout()?;
    assert!(stdout.contains("Profile: from-env"), "{stdout}");
    Ok(())
}

#[test]
fn test_cli_profile_overrides_env() -> Result<()> {
    let ws = workspace("bin/lsp", &[])?;
    let home = tempdir()?;

    let stdout = Doctor::new(home.path(), ws.path())
        .env("VOLO_SESSION_PROFILE", "from-env")
        .arg("--profile")
        .arg("from-cli")
        .stdout()?;
    assert!(stdout.contains("Profile: from-cli"), "{stdout}");
    Ok(())
}

#[test]
fn test_config_binder_policy_glob() -> Result<()> {
    let ws = workspace("bin/lsp", &["script_a_binder.json"])?;
    let home = tempdir()?;
    let mut table = toml::Table::new();
    table.insert("binder_policy".into(), toml::Value::String("glob".into()));
    let explicit = home.path().join("glob.toml");
    write_config(&explicit, &table)?;

    let stdout = Doctor::new(home.path(), ws.path())
        .arg("--config")
        .arg(&explicit)
        .stdout()?;
    assert!(stdout.contains("(glob policy)"), "{stdout}");
    assert!(stdout.contains("script_*_binder.json"), "{stdout}");
    Ok(())
}

#[test]
fn test_config_custom_server_layout() -> Result<()> {
    let ws = workspace("tools/volo-lsp", &[])?;
    let home = tempdir()?;
    let mut layout = toml::Table::new();
    layout.insert(
        "server".into(),
        toml::Value::String("tools/volo-lsp".into()),
    );
    let mut table = toml::Table::new();
    table.insert("layout".into(), toml::Value::Table(layout));
    let explicit = home.path().join("layout.toml");
    write_config(&explicit, &table)?;

    let stdout = Doctor::new(home.path(), ws.path())
        .arg("--config")
        .arg(&explicit)
        .stdout()?;
    assert!(stdout.contains("tools/volo-lsp --stdio"), "{stdout}");
    Ok(())
}

#[test]
fn test_invalid_policy_is_rejected() -> Result<()> {
    let ws = workspace("bin/lsp", &[])?;
    let home = tempdir()?;
    let mut table = toml::Table::new();
    table.insert(
        "binder_policy".into(),
        toml::Value::String("everything".into()),
    );
    let explicit = home.path().join("bad.toml");
    write_config(&explicit, &table)?;

    let result = Doctor::new(home.path(), ws.path())
        .arg("--config")
        .arg(&explicit)
        .stdout();
    assert!(result.is_err());
    Ok(())
}
