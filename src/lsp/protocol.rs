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

use anyhow::{Context, Result, anyhow, bail};
use bytes::{Buf, BytesMut};
use serde::{Deserialize, Serialize};

/// JSON-RPC error code for unknown methods.
pub const METHOD_NOT_FOUND: i64 = -32601;

fn default_null() -> serde_json::Value {
    serde_json::Value::Null
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RequestMessage {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default = "default_null")]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseMessage {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ResponseError>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NotificationMessage {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default = "default_null")]
    pub params: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ResponseMessage {
    /// Builds the reply sent for server requests the client does not implement.
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            result: None,
            error: Some(ResponseError {
                code: METHOD_NOT_FOUND,
                message: format!("Method '{method}' not supported by client"),
                data: None,
            }),
        }
    }
}

/// Serializes a message with its `Content-Length` header.
pub fn encode_message<T: Serialize>(message: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_string(message)?;
    let mut frame = format!("Content-Length: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(body.as_bytes());
    Ok(frame)
}

/// Pops one complete message body off the front of `buffer`.
///
/// Returns `Ok(None)` while the header or body is still incomplete. A
/// malformed frame is removed from the buffer before the error is returned,
/// so frames queued behind it can still be read.
pub fn try_parse_message(buffer: &mut BytesMut) -> Result<Option<String>> {
    let Some(header_end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") else {
        return Ok(None);
    };
    let body_start = header_end + 4;

    let content_length = match parse_content_length(&buffer[..header_end]) {
        Ok(length) => length,
        Err(e) => {
            // No usable length: only the header can be dropped
            buffer.advance(body_start);
            return Err(e);
        }
    };

    let Some(frame_end) = body_start.checked_add(content_length) else {
        buffer.advance(body_start);
        bail!("Content-Length {content_length} is out of range");
    };
    if buffer.len() < frame_end {
        return Ok(None);
    }

    buffer.advance(body_start);
    let body = buffer.split_to(content_length);
    let body = String::from_utf8(body.to_vec()).context("Message body is not valid UTF-8")?;
    Ok(Some(body))
}

fn parse_content_length(header: &[u8]) -> Result<usize> {
    let headers = std::str::from_utf8(header).context("Failed to parse headers as UTF-8")?;

    let mut content_length = None;
    for line in headers.lines() {
        if let Some((name, value)) = line.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            content_length = Some(
                value
                    .trim()
                    .parse::<usize>()
                    .context("Invalid Content-Length")?,
            );
        }
    }

    content_length.ok_or_else(|| anyhow!("Message header without Content-Length: {headers:?}"))
}
