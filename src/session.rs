// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Session bootstrapping and lifecycle control.
//!
//! [`SessionController`] owns at most one live client session. `activate`
//! discovers the workspace-provided server, spawns it and starts the
//! handshake in the background; `deactivate` lets a pending handshake
//! settle, stops the server and reports how the stop went.

use anyhow::{Context, Result, anyhow, bail};
use lsp_types::{Diagnostic, TextDocumentItem, Uri};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::discovery::{BinderLocator, Binders, ServerLocator};
use crate::error::BootstrapError;
use crate::launch::ServerProcessSpec;
use crate::lsp::{DocumentSelector, LspClient, SessionState, SessionStatus, language_id_for_path};
use crate::workspace::{WorkspaceFolder, path_to_uri};

/// What discovery found in the workspace, before anything is spawned.
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Server candidates in precedence order.
    pub searched: Vec<PathBuf>,
    /// Selected server executable.
    pub server: Option<PathBuf>,
    /// Binder schemas to pass to the server.
    pub binders: Binders,
}

impl Discovery {
    /// Builds the process spec.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::MissingServerBinary`] if no server was found.
    pub fn into_spec(self) -> Result<ServerProcessSpec, BootstrapError> {
        let server = self.server.ok_or(BootstrapError::MissingServerBinary {
            searched: self.searched,
        })?;
        Ok(ServerProcessSpec::stdio(server, &self.binders))
    }
}

struct ActiveSession {
    client: Arc<LspClient>,
    spec: ServerProcessSpec,
    handshake: JoinHandle<()>,
    open_documents: HashSet<Uri>,
}

/// Owns the single client session of this process.
pub struct SessionController {
    config: Config,
    active: Option<ActiveSession>,
}

impl SessionController {
    /// Creates a controller with no session.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            active: None,
        }
    }

    /// The configuration this controller was created with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Inspects the workspace without spawning anything.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured binder naming convention is invalid.
    pub fn discover(&self, folders: &[WorkspaceFolder]) -> Result<Discovery, BootstrapError> {
        let servers = ServerLocator::new(&self.config.layout.server);
        let binders = BinderLocator::new(self.config.binder_policy, &self.config.layout)?;

        Ok(Discovery {
            searched: servers.candidates(folders),
            server: servers.locate(folders),
            binders: binders.locate(folders),
        })
    }

    /// Resolves the server and its arguments for `folders`.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::MissingServerBinary`] if no folder provides a
    /// server executable.
    pub fn resolve(&self, folders: &[WorkspaceFolder]) -> Result<ServerProcessSpec, BootstrapError> {
        self.discover(folders)?.into_spec()
    }

    /// Payload sent as `initializationOptions`; `None` when nothing is configured.
    #[must_use]
    pub fn initialization_options(&self) -> Option<Value> {
        self.config
            .profile
            .as_ref()
            .map(|profile| json!({ "profile": profile }))
    }

    /// Starts a session for `folders`.
    ///
    /// Spawns the server and returns as soon as the process is running; the
    /// handshake completes in the background and its outcome is visible
    /// through [`SessionController::state`] and the logs.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`BootstrapError::MissingServerBinary`] before spawning if no
    /// server exists, [`BootstrapError::Spawn`] if it cannot be started, and
    /// [`BootstrapError::AlreadyActive`] if a session is already live.
    pub fn activate(&mut self, folders: &[WorkspaceFolder]) -> Result<(), BootstrapError> {
        if self.active.is_some() {
            return Err(BootstrapError::AlreadyActive);
        }

        let spec = self.resolve(folders)?;
        info!("Starting language server: {}", spec.command_line());

        let selector = DocumentSelector::new(&self.config.language_id);
        let client = LspClient::spawn(&spec, selector).map_err(|source| BootstrapError::Spawn {
            path: spec.command.clone(),
            source,
        })?;
        let client = Arc::new(client);

        let handshake = tokio::spawn(run_handshake(
            client.clone(),
            folders.to_vec(),
            self.initialization_options(),
        ));

        self.active = Some(ActiveSession {
            client,
            spec,
            handshake,
            open_documents: HashSet::new(),
        });
        Ok(())
    }

    /// Stops the session, if any, and waits for the server to exit.
    ///
    /// Without a session this returns immediately. A handshake still in
    /// flight is given the shutdown timeout to finish, so a healthy server
    /// receives `shutdown`/`exit`; one that does not answer in time is
    /// killed.
    ///
    /// # Errors
    ///
    /// Returns the error of the stop operation; the session is released
    /// either way.
    pub async fn deactivate(&mut self) -> Result<()> {
        let Some(active) = self.active.take() else {
            debug!("No language server session to stop");
            return Ok(());
        };
        let timeout = self.config.shutdown_timeout();

        settle_handshake(active.handshake, timeout).await;

        info!("Stopping language server (pid {:?})", active.client.pid());
        active.client.stop(timeout).await
    }

    /// Returns true while a session is held.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.active.is_some()
    }

    /// The client of the active session.
    #[must_use]
    pub fn client(&self) -> Option<&LspClient> {
        self.active.as_ref().map(|active| active.client.as_ref())
    }

    /// The process spec of the active session.
    #[must_use]
    pub fn spec(&self) -> Option<&ServerProcessSpec> {
        self.active.as_ref().map(|active| &active.spec)
    }

    /// Lifecycle state of the active session.
    #[must_use]
    pub fn state(&self) -> Option<SessionState> {
        self.client().map(LspClient::state)
    }

    /// Snapshot of the active session.
    #[must_use]
    pub fn status(&self) -> Option<SessionStatus> {
        let active = self.active.as_ref()?;
        let info = active.client.server_info();
        Some(SessionStatus {
            state: active.client.state(),
            command: active.spec.command.clone(),
            args: active.spec.process_args(),
            pid: active.client.pid(),
            server_name: info.map(|i| i.name.clone()),
            server_version: info.and_then(|i| i.version.clone()),
            open_documents: active.open_documents.len(),
        })
    }

    /// Waits for the handshake to finish one way or the other.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no session or `timeout` elapses.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<SessionState> {
        let client = self.require_client()?;
        client
            .wait_for_state(timeout, |state| state != SessionState::Starting)
            .await
    }

    /// Resolves once the server has gone away; `None` without a session.
    pub async fn closed(&self) -> Option<SessionState> {
        match self.client() {
            Some(client) => Some(client.closed().await),
            None => None,
        }
    }

    /// Opens a document in the session.
    ///
    /// Returns `false` without contacting the server when the document's
    /// language is not handled by the session.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no running session or the file cannot be
    /// read.
    pub async fn open_document(&mut self, path: &Path) -> Result<bool> {
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| anyhow!("No active language server session"))?;

        let Some(language_id) = language_id_for_path(path) else {
            debug!("No language for {}", path.display());
            return Ok(false);
        };
        if !active.client.selector().matches(language_id) {
            debug!("Not a {} document: {}", active.client.selector().language_id(), path.display());
            return Ok(false);
        }

        let path = path
            .canonicalize()
            .with_context(|| format!("Failed to resolve {}", path.display()))?;
        let uri = path_to_uri(&path)?;
        if active.open_documents.contains(&uri) {
            return Ok(true);
        }

        let state = active.client.state();
        if state != SessionState::Running {
            bail!("Language server is not running (state: {state})");
        }

        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let handled = active
            .client
            .did_open(TextDocumentItem {
                uri: uri.clone(),
                language_id: language_id.to_string(),
                version: 1,
                text,
            })
            .await?;
        if handled {
            active.open_documents.insert(uri);
        }
        Ok(handled)
    }

    /// Closes a document previously opened with [`SessionController::open_document`].
    ///
    /// # Errors
    ///
    /// Returns an error if there is no session or the notification fails.
    pub async fn close_document(&mut self, path: &Path) -> Result<bool> {
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| anyhow!("No active language server session"))?;

        let uri = path_to_uri(&path.canonicalize()?)?;
        if !active.open_documents.remove(&uri) {
            return Ok(false);
        }
        active.client.did_close(uri).await?;
        Ok(true)
    }

    /// Diagnostics most recently published for `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no session or the path cannot be resolved.
    pub async fn diagnostics(&self, path: &Path) -> Result<Vec<Diagnostic>> {
        let client = self.require_client()?;
        let uri = path_to_uri(&path.canonicalize()?)?;
        Ok(client.get_diagnostics(&uri).await)
    }

    fn require_client(&self) -> Result<&LspClient> {
        self.client()
            .ok_or_else(|| anyhow!("No active language server session"))
    }
}

async fn run_handshake(
    client: Arc<LspClient>,
    folders: Vec<WorkspaceFolder>,
    initialization_options: Option<Value>,
) {
    match client.initialize(&folders, initialization_options).await {
        Ok(result) => {
            let name = result
                .server_info
                .map_or_else(|| "Language server".to_string(), |info| info.name);
            info!("{} ready", name);
        }
        Err(e) => error!("Language server handshake failed: {:#}", e),
    }
}

/// Waits up to `timeout` for the handshake task, cancelling it if it is
/// still pending. Returns false when it had to be cancelled.
async fn settle_handshake(mut handshake: JoinHandle<()>, timeout: Duration) -> bool {
    match tokio::time::timeout(timeout, &mut handshake).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            if e.is_panic() {
                warn!("Handshake task panicked: {}", e);
            } else {
                debug!("Handshake task was cancelled");
            }
            true
        }
        Err(_) => {
            debug!("Handshake still pending after {:?}, cancelling", timeout);
            handshake.abort();
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::BinderPolicy;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    fn workspace(server: bool, schemas: &[&str]) -> Result<TempDir> {
        let dir = tempdir()?;
        if server {
            fs::create_dir_all(dir.path().join("bin"))?;
            fs::write(dir.path().join("bin/lsp"), b"")?;
        }
        if !schemas.is_empty() {
            let schema_dir = dir.path().join("assets/schemas");
            fs::create_dir_all(&schema_dir)?;
            for name in schemas {
                fs::write(schema_dir.join(name), b"{}")?;
            }
        }
        Ok(dir)
    }

    fn controller(policy: BinderPolicy) -> SessionController {
        SessionController::new(Config {
            binder_policy: policy,
            ..Config::default()
        })
    }

    #[test]
    fn test_resolve_without_schemas() -> Result<()> {
        let ws = workspace(true, &[])?;
        let spec = controller(BinderPolicy::Scan).resolve(&[WorkspaceFolder::new(ws.path())])?;
        assert_eq!(spec.command, ws.path().join("bin/lsp"));
        assert!(spec.args.is_empty());
        Ok(())
    }

    #[test]
    fn test_resolve_scan_lists_schemas() -> Result<()> {
        let ws = workspace(true, &["script_b_binder.json", "script_a_binder.json"])?;
        let spec = controller(BinderPolicy::Scan).resolve(&[WorkspaceFolder::new(ws.path())])?;

        let schemas = ws.path().join("assets/schemas");
        assert_eq!(
            spec.args,
            vec![
                "--binders".to_string(),
                schemas.join("script_a_binder.json").display().to_string(),
                schemas.join("script_b_binder.json").display().to_string(),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_resolve_glob_defers_matching() -> Result<()> {
        let ws = workspace(true, &["script_a_binder.json", "script_b_binder.json"])?;
        let spec = controller(BinderPolicy::Glob).resolve(&[WorkspaceFolder::new(ws.path())])?;
        assert_eq!(
            spec.args,
            vec![
                "--binders".to_string(),
                ws.path()
                    .join("assets/schemas/script_*_binder.json")
                    .display()
                    .to_string(),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_resolve_missing_server() -> Result<()> {
        let ws = workspace(false, &["script_a_binder.json"])?;
        let err = controller(BinderPolicy::Scan)
            .resolve(&[WorkspaceFolder::new(ws.path())])
            .err()
            .ok_or_else(|| anyhow!("expected MissingServerBinary"))?;
        match err {
            BootstrapError::MissingServerBinary { searched } => {
                assert_eq!(searched.first(), Some(&ws.path().join("bin/lsp")));
            }
            other => bail!("unexpected error: {other}"),
        }
        Ok(())
    }

    #[test]
    fn test_discover_reports_binders_without_server() -> Result<()> {
        let ws = workspace(false, &["script_a_binder.json"])?;
        let discovery = controller(BinderPolicy::Scan).discover(&[WorkspaceFolder::new(ws.path())])?;
        assert_eq!(discovery.server, None);
        assert_eq!(discovery.binders.paths().len(), 1);
        Ok(())
    }

    #[test]
    fn test_initialization_options_forward_profile() {
        let mut config = Config::default();
        assert_eq!(SessionController::new(config.clone()).initialization_options(), None);

        config.profile = Some("debug".to_string());
        assert_eq!(
            SessionController::new(config).initialization_options(),
            Some(json!({ "profile": "debug" }))
        );
    }

    #[tokio::test]
    async fn test_deactivate_without_session_is_noop() -> Result<()> {
        let mut controller = controller(BinderPolicy::Scan);
        controller.deactivate().await?;
        controller.deactivate().await?;
        assert!(!controller.is_active());
        assert!(controller.status().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_activate_missing_server_spawns_nothing() -> Result<()> {
        let ws = workspace(false, &[])?;
        let mut controller = controller(BinderPolicy::Scan);
        let result = controller.activate(&[WorkspaceFolder::new(ws.path())]);
        assert!(matches!(
            result,
            Err(BootstrapError::MissingServerBinary { .. })
        ));
        assert!(!controller.is_active());
        Ok(())
    }

    #[tokio::test]
    #[allow(clippy::panic, reason = "simulates a crashing handshake task")]
    async fn test_settle_handshake_absorbs_panic() {
        let handshake = tokio::spawn(async { panic!("handshake bug") });
        assert!(settle_handshake(handshake, Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_settle_handshake_cancels_when_stuck() {
        let handshake = tokio::spawn(std::future::pending::<()>());
        assert!(!settle_handshake(handshake, Duration::from_millis(20)).await);
    }
}
