// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! A mock Volo script language server for testing.
//!
//! Accepts the same command line as the real server (`--stdio`, `--binder`,
//! `--binders`) and speaks Content-Length framed JSON-RPC over stdin/stdout.
//! Extra flags record what it was started with and inject failures.

use std::io::{Read, Write};
use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Mock Volo language server for integration testing.
#[derive(Parser, Debug)]
#[command(name = "mockls")]
struct Args {
    /// Use stdin and stdout for communication.
    #[arg(long)]
    stdio: bool,

    /// Script binder schema to use.
    #[arg(short, long)]
    binder: Option<PathBuf>,

    /// Script binder schemas or wildcard patterns to use.
    #[arg(long, num_args = 1..)]
    binders: Vec<String>,

    /// Write argv, the initialize params and whether shutdown arrived to
    /// this file as JSON (default: `<executable>.record.json`).
    #[arg(long)]
    record: Option<PathBuf>,

    /// Return `InternalError` for this method (repeatable).
    #[arg(long)]
    fail_on: Vec<String>,

    /// Exit after n responses (simulate crash).
    #[arg(long)]
    drop_after: Option<u64>,

    /// Exit as soon as this method arrives (repeatable).
    #[arg(long)]
    crash_on: Vec<String>,
}

/// A JSON-RPC request or notification.
#[derive(Debug, Deserialize)]
struct Message {
    id: Option<Value>,
    method: Option<String>,
    #[serde(default)]
    params: Value,
}

/// A JSON-RPC response.
#[derive(Debug, Serialize)]
struct Response {
    jsonrpc: &'static str,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// What the server was started with, as written to `--record`.
#[derive(Debug, Serialize)]
struct Record {
    argv: Vec<String>,
    binders: Vec<String>,
    initialize: Option<Value>,
    shutdown: bool,
}

struct MockServer<W: Write> {
    args: Args,
    record: Record,
    response_count: u64,
    out: W,
}

impl<W: Write> MockServer<W> {
    fn new(args: Args, out: W) -> Self {
        let binders = args
            .binder
            .iter()
            .map(|p| p.display().to_string())
            .chain(args.binders.iter().cloned())
            .collect();
        let record = Record {
            argv: std::env::args().skip(1).collect(),
            binders,
            initialize: None,
            shutdown: false,
        };
        Self {
            args,
            record,
            response_count: 0,
            out,
        }
    }

    /// Serves until `exit`, EOF, or a simulated crash. Returns the exit code.
    fn run(&mut self, reader: &mut dyn Read) -> i32 {
        self.write_record();
        self.log_message(&format!(
            "Server loaded {} script-binder(s)",
            self.record.binders.len()
        ));

        let mut buffer = Vec::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) | Err(_) => return 1,
                Ok(n) => buffer.extend_from_slice(&temp[..n]),
            }

            while let Some((body, consumed)) = try_parse_message(&buffer) {
                buffer.drain(..consumed);
                let Ok(message) = serde_json::from_str::<Message>(&body) else {
                    continue;
                };
                if let Some(code) = self.handle(message) {
                    return code;
                }
            }
        }
    }

    fn handle(&mut self, message: Message) -> Option<i32> {
        let method = message.method?;
        if self.args.crash_on.iter().any(|m| m == &method) {
            return Some(101);
        }
        let Some(id) = message.id else {
            return self.handle_notification(&method, &message.params);
        };

        if self.args.fail_on.iter().any(|m| m == &method) {
            self.respond(id, Err(format!("mockls: configured to fail on {method}")));
            return self.crashed();
        }

        let result = match method.as_str() {
            "initialize" => {
                self.record.initialize = Some(message.params);
                self.write_record();
                Ok(json!({
                    "capabilities": {
                        "textDocumentSync": { "openClose": true, "change": 1 },
                        "hoverProvider": {},
                        "completionProvider": { "triggerCharacters": ["$"] },
                    },
                    "serverInfo": { "name": "mockls", "version": env!("CARGO_PKG_VERSION") }
                }))
            }
            "shutdown" => {
                self.record.shutdown = true;
                self.write_record();
                Ok(Value::Null)
            }
            _ => Err(format!("mockls: method not found: {method}")),
        };
        self.respond(id, result);
        self.crashed()
    }

    fn handle_notification(&mut self, method: &str, params: &Value) -> Option<i32> {
        match method {
            "textDocument/didOpen" => {
                let uri = params
                    .pointer("/textDocument/uri")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                self.publish_diagnostics(&uri);
                None
            }
            "exit" => Some(if self.record.shutdown { 0 } else { 1 }),
            _ => None,
        }
    }

    fn respond(&mut self, id: Value, result: Result<Value, String>) {
        let response = match result {
            Ok(value) => Response {
                jsonrpc: "2.0",
                id,
                result: Some(value),
                error: None,
            },
            Err(message) => Response {
                jsonrpc: "2.0",
                id,
                result: None,
                error: Some(RpcError {
                    code: if message.contains("method not found") { -32601 } else { -32603 },
                    message,
                }),
            },
        };
        self.send(&response);
        self.response_count += 1;
    }

    /// Returns an exit code once `--drop-after` responses have been sent.
    fn crashed(&self) -> Option<i32> {
        self.args
            .drop_after
            .filter(|limit| self.response_count >= *limit)
            .map(|_| 101)
    }

    fn publish_diagnostics(&mut self, uri: &str) {
        self.send(&json!({
            "jsonrpc": "2.0",
            "method": "textDocument/publishDiagnostics",
            "params": {
                "uri": uri,
                "diagnostics": [{
                    "range": {
                        "start": { "line": 0, "character": 0 },
                        "end": { "line": 0, "character": 1 }
                    },
                    "severity": 3,
                    "source": "mockls",
                    "message": "mockls: document received"
                }]
            }
        }));
    }

    fn log_message(&mut self, message: &str) {
        self.send(&json!({
            "jsonrpc": "2.0",
            "method": "window/logMessage",
            "params": { "type": 3, "message": message }
        }));
    }

    fn send<T: Serialize>(&mut self, message: &T) {
        let Ok(body) = serde_json::to_string(message) else {
            return;
        };
        let _ = write!(self.out, "Content-Length: {}\r\n\r\n{}", body.len(), body);
        let _ = self.out.flush();
    }

    fn write_record(&self) {
        let Some(path) = self.args.record.clone().or_else(default_record_path) else {
            return;
        };
        if let Ok(json) = serde_json::to_string_pretty(&self.record) {
            let _ = std::fs::write(path, json);
        }
    }
}

/// Record file next to the running executable, so a copy installed into a
/// test workspace reports there without extra arguments.
fn default_record_path() -> Option<PathBuf> {
    let exe = std::env::current_exe().ok()?;
    let mut name = exe.file_name()?.to_os_string();
    name.push(".record.json");
    Some(exe.with_file_name(name))
}

/// Parses one message off the front of `buffer`, returning the body and the
/// number of bytes consumed.
fn try_parse_message(buffer: &[u8]) -> Option<(String, usize)> {
    let header_end = buffer.windows(4).position(|w| w == b"\r\n\r\n")?;
    let headers = std::str::from_utf8(&buffer[..header_end]).ok()?;
    let length = headers.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim()
            .eq_ignore_ascii_case("content-length")
            .then(|| value.trim().parse::<usize>().ok())?
    })?;

    let start = header_end + 4;
    let body = buffer.get(start..start + length)?;
    Some((String::from_utf8_lossy(body).into_owned(), start + length))
}

fn main() {
    let args = Args::parse();
    if !args.stdio {
        // Same as the real server: without a transport there is nothing to serve
        std::process::exit(2);
    }

    let mut server = MockServer::new(args, std::io::stdout());
    let code = server.run(&mut std::io::stdin());
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(body: &str) -> Vec<u8> {
        format!("Content-Length: {}\r\n\r\n{}", body.len(), body).into_bytes()
    }

    fn parse_args(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("mockls").chain(argv.iter().copied()))
    }

    /// Args with the record file inside `dir`, keeping test runs out of `target/`.
    fn recorded_args(dir: &tempfile::TempDir, argv: &[&str]) -> Args {
        let mut args = parse_args(argv);
        args.record = Some(dir.path().join("record.json"));
        args
    }

    fn responses(out: &[u8]) -> Vec<Value> {
        let mut rest = out.to_vec();
        let mut messages = Vec::new();
        while let Some((body, consumed)) = try_parse_message(&rest) {
            rest.drain(..consumed);
            if let Ok(value) = serde_json::from_str(&body) {
                messages.push(value);
            }
        }
        messages
    }

    #[test]
    fn test_binders_flag_takes_many_values() {
        let args = parse_args(&["--stdio", "--binders", "/a.json", "/b.json"]);
        assert!(args.stdio);
        assert_eq!(args.binders, vec!["/a.json", "/b.json"]);
        assert!(args.binder.is_none());
    }

    #[test]
    fn test_initialize_shutdown_exit() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let mut input = Vec::new();
        input.extend(frame(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{"initializationOptions":{"profile":"dev"}}}"#));
        input.extend(frame(r#"{"jsonrpc":"2.0","method":"initialized","params":{}}"#));
        input.extend(frame(r#"{"jsonrpc":"2.0","id":2,"method":"shutdown"}"#));
        input.extend(frame(r#"{"jsonrpc":"2.0","method":"exit"}"#));

        let mut out = Vec::new();
        let mut server = MockServer::new(recorded_args(&dir, &["--stdio"]), &mut out);
        let code = server.run(&mut input.as_slice());
        assert_eq!(code, 0);
        assert_eq!(
            server.record.initialize.as_ref().and_then(|p| p.pointer("/initializationOptions/profile")),
            Some(&json!("dev"))
        );
        drop(server);

        let messages = responses(&out);
        assert_eq!(messages[0]["method"], "window/logMessage");
        assert_eq!(messages[1]["result"]["serverInfo"]["name"], "mockls");
        assert_eq!(messages[2]["id"], 2);

        let record: Value = serde_json::from_str(&std::fs::read_to_string(dir.path().join("record.json"))?)?;
        assert_eq!(record["initialize"]["initializationOptions"]["profile"], "dev");
        assert_eq!(record["shutdown"], true);
        Ok(())
    }

    #[test]
    fn test_fail_on_returns_internal_error() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let input = frame(r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#);
        let mut out = Vec::new();
        let mut server = MockServer::new(
            recorded_args(&dir, &["--stdio", "--fail-on", "initialize"]),
            &mut out,
        );
        let code = server.run(&mut input.as_slice());
        assert_eq!(code, 1);
        drop(server);

        let messages = responses(&out);
        assert_eq!(messages[1]["error"]["code"], -32603);
        Ok(())
    }

    #[test]
    fn test_crash_on_notification() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let input = frame(r#"{"jsonrpc":"2.0","method":"textDocument/didOpen","params":{}}"#);
        let mut out = Vec::new();
        let mut server = MockServer::new(
            recorded_args(&dir, &["--stdio", "--crash-on", "textDocument/didOpen"]),
            &mut out,
        );
        assert_eq!(server.run(&mut input.as_slice()), 101);
        Ok(())
    }

    #[test]
    fn test_parse_incomplete_body() {
        let raw = b"Content-Length: 10\r\n\r\n{\"a\"";
        assert!(try_parse_message(raw).is_none());
    }
}
