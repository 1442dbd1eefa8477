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

//! Session lifecycle state and status reporting.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Lifecycle of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Server spawned, `initialize` not yet answered.
    Starting,
    /// Handshake complete.
    Running,
    /// `shutdown`/`exit` sent, waiting for the process.
    Stopping,
    /// Process gone after a requested stop.
    Stopped,
    /// Handshake failed or the server went away on its own.
    Failed,
}

impl SessionState {
    /// Returns true once the session can no longer serve requests.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Snapshot of the active session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    /// Lifecycle state.
    pub state: SessionState,
    /// Server executable.
    pub command: PathBuf,
    /// Arguments passed to the server, including the transport flag.
    pub args: Vec<String>,
    /// OS process id, if the process is still known.
    pub pid: Option<u32>,
    /// `serverInfo.name` from the handshake.
    pub server_name: Option<String>,
    /// `serverInfo.version` from the handshake.
    pub server_version: Option<String>,
    /// Number of documents opened through the session.
    pub open_documents: usize,
}
