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

use anyhow::{Context, Result, anyhow};
use bytes::BytesMut;
use lsp_types::{
    ClientCapabilities, ClientInfo, Diagnostic, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, InitializeParams, InitializeResult, InitializedParams,
    PublishDiagnosticsClientCapabilities, PublishDiagnosticsParams, ServerInfo,
    TextDocumentClientCapabilities, TextDocumentIdentifier, TextDocumentItem,
    TextDocumentSyncClientCapabilities, Uri,
};
use std::collections::HashMap;
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use super::protocol::{self, NotificationMessage, RequestId, RequestMessage, ResponseMessage};
use super::selector::DocumentSelector;
use super::state::SessionState;
use crate::launch::ServerProcessSpec;
use crate::workspace::WorkspaceFolder;

/// Cached diagnostics for a file.
pub type DiagnosticsCache = Arc<Mutex<HashMap<Uri, Vec<Diagnostic>>>>;

type PendingRequests = Arc<Mutex<HashMap<RequestId, oneshot::Sender<ResponseMessage>>>>;

/// Default timeout for LSP requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Manages communication with the language server process.
pub struct LspClient {
    next_id: AtomicI64,
    stdin: Arc<Mutex<ChildStdin>>,
    pending: PendingRequests,
    diagnostics: DiagnosticsCache,
    state: Arc<watch::Sender<SessionState>>,
    selector: DocumentSelector,
    server_info: OnceLock<ServerInfo>,
    pid: Option<u32>,
    child: Mutex<Child>,
    _reader_handle: JoinHandle<()>,
}

impl LspClient {
    /// Spawns the server described by `spec` and starts the response reader task.
    ///
    /// Must be called from within a tokio runtime. The handshake is not
    /// performed here; see [`LspClient::initialize`].
    ///
    /// # Errors
    ///
    /// Returns the OS error if the process cannot be started.
    pub fn spawn(spec: &ServerProcessSpec, selector: DocumentSelector) -> io::Result<Self> {
        let mut child = Command::new(&spec.command)
            .args(spec.process_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("stdin not captured"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("stdout not captured"))?;
        let pid = child.id();

        let stdin = Arc::new(Mutex::new(stdin));
        let pending: PendingRequests = Arc::new(Mutex::new(HashMap::new()));
        let diagnostics: DiagnosticsCache = Arc::new(Mutex::new(HashMap::new()));
        let (state, _) = watch::channel(SessionState::Starting);
        let state = Arc::new(state);

        let reader_handle = tokio::spawn(Self::reader_task(
            stdin.clone(),
            stdout,
            pending.clone(),
            diagnostics.clone(),
            state.clone(),
        ));

        debug!("Spawned language server (pid {:?})", pid);

        Ok(Self {
            next_id: AtomicI64::new(1),
            stdin,
            pending,
            diagnostics,
            state,
            selector,
            server_info: OnceLock::new(),
            pid,
            child: Mutex::new(child),
            _reader_handle: reader_handle,
        })
    }

    /// Background task that reads LSP messages and routes responses to pending requests.
    async fn reader_task(
        stdin: Arc<Mutex<ChildStdin>>,
        stdout: ChildStdout,
        pending: PendingRequests,
        diagnostics: DiagnosticsCache,
        state: Arc<watch::Sender<SessionState>>,
    ) {
        let mut reader = BufReader::new(stdout);
        let mut buffer = BytesMut::with_capacity(8192);

        loop {
            let mut temp = [0u8; 4096];
            match reader.read(&mut temp).await {
                Ok(0) => {
                    debug!("LSP stdout closed");
                    break;
                }
                Ok(n) => {
                    buffer.extend_from_slice(&temp[..n]);
                }
                Err(e) => {
                    error!("Error reading from LSP stdout: {}", e);
                    break;
                }
            }

            loop {
                let message_str = match protocol::try_parse_message(&mut buffer) {
                    Ok(Some(message)) => message,
                    Ok(None) => break,
                    Err(e) => {
                        // The bad frame is already consumed; keep reading what follows
                        warn!("Discarding malformed LSP frame: {:#}", e);
                        continue;
                    }
                };
                trace!("Received LSP message: {}", message_str);

                let value: serde_json::Value = match serde_json::from_str(&message_str) {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("Failed to parse JSON: {}", e);
                        continue;
                    }
                };

                if let Some(method) = value.get("method").and_then(|m| m.as_str()) {
                    if let Some(id) = value.get("id") {
                        // Server request (e.g. workspace/configuration): decline so the server is not left waiting
                        debug!("Received server request: {} (id: {})", method, id);
                        let id = serde_json::from_value(id.clone()).unwrap_or(RequestId::Number(0));
                        let response = ResponseMessage::method_not_found(id, method);
                        if let Err(e) = Self::write_frame(&stdin, &response).await {
                            warn!("Failed to answer server request {}: {}", method, e);
                        }
                    } else if let Ok(notification) =
                        serde_json::from_value::<NotificationMessage>(value)
                    {
                        Self::handle_notification(&notification, &diagnostics).await;
                    }
                } else if value.get("id").is_some() {
                    if let Ok(response) = serde_json::from_value::<ResponseMessage>(value)
                        && let Some(id) = &response.id
                    {
                        let mut pending = pending.lock().await;
                        if let Some(sender) = pending.remove(id) {
                            let _ = sender.send(response);
                        } else {
                            warn!("Received response for unknown request id: {:?}", id);
                        }
                    }
                } else {
                    warn!("Unknown message format: {}", message_str);
                }
            }
        }

        // Fail outstanding requests instead of letting them run into the timeout
        pending.lock().await.clear();

        state.send_modify(|current| {
            *current = match *current {
                SessionState::Stopping | SessionState::Stopped => SessionState::Stopped,
                _ => SessionState::Failed,
            };
        });
        if *state.borrow() == SessionState::Failed {
            warn!("Language server connection lost");
        }
    }

    /// Handles incoming LSP notifications.
    async fn handle_notification(
        notification: &NotificationMessage,
        diagnostics: &DiagnosticsCache,
    ) {
        match notification.method.as_str() {
            "textDocument/publishDiagnostics" => {
                if let Ok(params) =
                    serde_json::from_value::<PublishDiagnosticsParams>(notification.params.clone())
                {
                    debug!(
                        "Received {} diagnostics for {:?}",
                        params.diagnostics.len(),
                        params.uri.as_str()
                    );
                    let mut cache = diagnostics.lock().await;
                    cache.insert(params.uri, params.diagnostics);
                } else {
                    warn!("Failed to parse publishDiagnostics params");
                }
            }
            "window/showMessage" => {
                if let Some(message) = notification.params.get("message").and_then(|m| m.as_str()) {
                    info!("Language server: {}", message);
                }
            }
            "window/logMessage" => {
                if let Some(message) = notification.params.get("message").and_then(|m| m.as_str()) {
                    debug!("Language server: {}", message);
                }
            }
            _ => {
                trace!(
                    "Ignoring notification: {} params={}",
                    notification.method, notification.params
                );
            }
        }
    }

    /// Sends a request and waits for the response with timeout.
    async fn request<P: serde::Serialize, R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> Result<R> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));

        let request = RequestMessage {
            jsonrpc: "2.0".to_string(),
            id: id.clone(),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        };

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        self.send_message(&request).await?;

        let response = match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(anyhow!("LSP server closed connection"));
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(anyhow!(
                    "LSP request '{}' timed out after {:?}",
                    method,
                    REQUEST_TIMEOUT
                ));
            }
        };

        if let Some(error) = response.error {
            return Err(anyhow!("LSP error {}: {}", error.code, error.message));
        }

        let result = response.result.unwrap_or(serde_json::Value::Null);

        serde_json::from_value(result).context("Failed to parse LSP response")
    }

    /// Sends a notification (no response expected).
    async fn notify<P: serde::Serialize>(&self, method: &str, params: P) -> Result<()> {
        let notification = NotificationMessage {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: serde_json::to_value(params)?,
        };

        self.send_message(&notification).await
    }

    async fn send_message<T: serde::Serialize>(&self, message: &T) -> Result<()> {
        Self::write_frame(&self.stdin, message).await
    }

    async fn write_frame<T: serde::Serialize>(
        stdin: &Mutex<ChildStdin>,
        message: &T,
    ) -> Result<()> {
        let frame = protocol::encode_message(message)?;
        trace!("Sending LSP message: {}", String::from_utf8_lossy(&frame));

        let mut stdin = stdin.lock().await;
        stdin.write_all(&frame).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Performs the LSP initialize handshake.
    ///
    /// `initialization_options` is sent verbatim; the session moves to
    /// [`SessionState::Running`] on success and [`SessionState::Failed`]
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if a folder cannot be expressed as a URI, the server
    /// rejects the request, or the connection is lost.
    pub async fn initialize(
        &self,
        folders: &[WorkspaceFolder],
        initialization_options: Option<serde_json::Value>,
    ) -> Result<InitializeResult> {
        match self.handshake(folders, initialization_options).await {
            Ok(result) => {
                self.state.send_if_modified(|state| {
                    let starting = *state == SessionState::Starting;
                    if starting {
                        *state = SessionState::Running;
                    }
                    starting
                });
                Ok(result)
            }
            Err(e) => {
                self.state.send_if_modified(|state| {
                    let live = !state.is_terminal() && *state != SessionState::Stopping;
                    if live {
                        *state = SessionState::Failed;
                    }
                    live
                });
                Err(e)
            }
        }
    }

    async fn handshake(
        &self,
        folders: &[WorkspaceFolder],
        initialization_options: Option<serde_json::Value>,
    ) -> Result<InitializeResult> {
        let workspace_folders = folders
            .iter()
            .map(WorkspaceFolder::to_lsp)
            .collect::<Result<Vec<_>>>()?;

        let params = InitializeParams {
            process_id: Some(std::process::id()),
            client_info: Some(ClientInfo {
                name: "volo-session".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            initialization_options,
            capabilities: ClientCapabilities {
                text_document: Some(TextDocumentClientCapabilities {
                    synchronization: Some(TextDocumentSyncClientCapabilities {
                        dynamic_registration: Some(false),
                        ..Default::default()
                    }),
                    publish_diagnostics: Some(PublishDiagnosticsClientCapabilities::default()),
                    ..Default::default()
                }),
                ..Default::default()
            },
            workspace_folders: (!workspace_folders.is_empty()).then_some(workspace_folders),
            ..Default::default()
        };

        let result: InitializeResult = self.request("initialize", params).await?;

        if let Some(info) = &result.server_info {
            debug!(
                "Server identified as {} {}",
                info.name,
                info.version.as_deref().unwrap_or("")
            );
            let _ = self.server_info.set(info.clone());
        }

        self.notify("initialized", InitializedParams {}).await?;

        Ok(result)
    }

    /// Sends shutdown request and exit notification.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not acknowledge `shutdown`.
    pub async fn shutdown(&self) -> Result<()> {
        // shutdown response varies by server (null, true, etc.) - ignore result
        let _: serde_json::Value = self.request("shutdown", serde_json::Value::Null).await?;
        self.notify("exit", serde_json::Value::Null).await?;
        Ok(())
    }

    /// Stops the server and waits for the process to exit.
    ///
    /// A running server gets `shutdown`/`exit`; a server that never finished
    /// the handshake is killed. If the process is still alive after `timeout`
    /// it is killed as well.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown failed or the process could
    /// not be reaped.
    pub async fn stop(&self, timeout: Duration) -> Result<()> {
        let graceful = self.state() == SessionState::Running;
        self.state.send_modify(|state| {
            if !state.is_terminal() {
                *state = SessionState::Stopping;
            }
        });

        let mut outcome = Ok(());
        if graceful {
            outcome = match tokio::time::timeout(timeout, self.shutdown()).await {
                Ok(result) => result,
                Err(_) => Err(anyhow!("Language server did not acknowledge shutdown")),
            };
        }

        let mut child = self.child.lock().await;
        if !graceful {
            // Already-exited processes reject the signal; the wait below still reaps them
            let _ = child.start_kill();
        }

        match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => debug!("Language server exited with {}", status),
            Ok(Err(e)) => {
                outcome = outcome.and(Err(anyhow!("Failed to wait for language server: {e}")));
            }
            Err(_) => {
                warn!(
                    "Language server did not exit within {:?}, killing it",
                    timeout
                );
                if let Err(e) = child.kill().await {
                    outcome = outcome.and(Err(anyhow!("Failed to kill language server: {e}")));
                }
            }
        }

        self.state.send_replace(SessionState::Stopped);
        outcome
    }

    /// Notifies the server that a document was opened.
    ///
    /// Documents outside the selector are not sent; returns whether the
    /// document was handled.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification cannot be written.
    pub async fn did_open(&self, document: TextDocumentItem) -> Result<bool> {
        if !self.selector.matches(&document.language_id) {
            debug!(
                "Skipping {} document {}",
                document.language_id,
                document.uri.as_str()
            );
            return Ok(false);
        }
        self.notify(
            "textDocument/didOpen",
            DidOpenTextDocumentParams {
                text_document: document,
            },
        )
        .await?;
        Ok(true)
    }

    /// Notifies the server that a document was closed.
    ///
    /// # Errors
    ///
    /// Returns an error if the notification cannot be written.
    pub async fn did_close(&self, uri: Uri) -> Result<()> {
        self.notify(
            "textDocument/didClose",
            DidCloseTextDocumentParams {
                text_document: TextDocumentIdentifier { uri },
            },
        )
        .await
    }

    /// Gets cached diagnostics for a specific URI.
    pub async fn get_diagnostics(&self, uri: &Uri) -> Vec<Diagnostic> {
        let cache = self.diagnostics.lock().await;
        cache.get(uri).cloned().unwrap_or_default()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Waits until `done` holds for the state, or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout.
    pub async fn wait_for_state(
        &self,
        timeout: Duration,
        done: impl Fn(SessionState) -> bool,
    ) -> Result<SessionState> {
        let mut rx = self.state.subscribe();
        let waited = tokio::time::timeout(timeout, rx.wait_for(|state| done(*state))).await;
        match waited {
            Ok(Ok(state)) => Ok(*state),
            Ok(Err(_)) => Ok(self.state()),
            Err(_) => Err(anyhow!(
                "Timed out after {:?} waiting for language server (state: {})",
                timeout,
                self.state()
            )),
        }
    }

    /// Resolves once the session has stopped or failed.
    pub async fn closed(&self) -> SessionState {
        let mut rx = self.state.subscribe();
        match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    /// Server identity reported during the handshake.
    #[must_use]
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.get()
    }

    /// OS process id of the server.
    #[must_use]
    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// The document selector this client was created with.
    #[must_use]
    pub const fn selector(&self) -> &DocumentSelector {
        &self.selector
    }
}
