use std::io;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

const LINE_ENDINGS: &[u8] = b"\r\n";

/// Status mpv reports in the `error` field of a successful command.
pub const SUCCESS: &str = "success";

/// Outbound command frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandRequest {
    pub command: Vec<Value>,
    pub request_id: u64,
}

/// Reply to a [`CommandRequest`], correlated by `id`.
///
/// mpv names the status field `error` even though it carries `"success"` for
/// commands that worked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResult {
    #[serde(rename = "error", default, deserialize_with = "empty_if_null")]
    pub status: String,
    #[serde(default)]
    pub data: Value,
    #[serde(rename = "request_id", default)]
    pub id: u64,
}

impl CommandResult {
    pub fn is_success(&self) -> bool {
        self.status == SUCCESS
    }

    /// Converts the reply into the value handed back to the caller.
    pub fn into_value(self) -> Result<Value> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(Error::RemoteError {
                status: self.status,
            })
        }
    }
}

/// Unsolicited notification pushed by mpv.
///
/// String fields that mpv leaves out (or sends as `null`) decode as empty.
/// `property`, `id` and `data` are only set by events such as
/// `property-change`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Event {
    #[serde(rename = "event", default, deserialize_with = "empty_if_null")]
    pub name: String,
    #[serde(default, deserialize_with = "empty_if_null")]
    pub reason: String,
    #[serde(default, deserialize_with = "empty_if_null")]
    pub prefix: String,
    #[serde(default, deserialize_with = "empty_if_null")]
    pub level: String,
    #[serde(default, deserialize_with = "empty_if_null")]
    pub text: String,
    #[serde(rename = "name", default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Event {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Result(CommandResult),
    Event(Event),
}

impl Frame {
    /// Classifies one raw frame.
    ///
    /// Result shape wins: a frame is only considered as an event when it was
    /// not accepted as a command result. Returns `None` for anything that is
    /// neither (invalid JSON, non-objects, empty status and event name).
    pub fn classify(bytes: &[u8]) -> Option<Frame> {
        let value: Value = serde_json::from_slice(bytes).ok()?;
        if !value.is_object() {
            return None;
        }

        if let Ok(result) = CommandResult::deserialize(&value) {
            if !result.status.is_empty() {
                return Some(Frame::Result(result));
            }
        }

        match Event::deserialize(&value) {
            Ok(event) if !event.name.is_empty() => Some(Frame::Event(event)),
            _ => None,
        }
    }
}

fn empty_if_null<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Reads the next non-blank frame, without its line terminator.
///
/// Returns `Ok(None)` once the stream is exhausted. Frames are returned as
/// raw bytes so a peer emitting invalid UTF-8 cannot take the reader down.
pub async fn read_frame<R>(reader: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        let bytes = reader.read_until(b'\n', &mut line).await?;
        if bytes == 0 {
            return Ok(None);
        }

        while line.last().is_some_and(|byte| LINE_ENDINGS.contains(byte)) {
            line.pop();
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }

        return Ok(Some(line));
    }
}

/// Serializes `message` as one newline-terminated frame.
pub fn encode_frame<T>(message: &T) -> io::Result<Vec<u8>>
where
    T: Serialize,
{
    let mut encoded = serde_json::to_vec(message).map_err(to_io_error)?;
    encoded.push(b'\n');
    Ok(encoded)
}

pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let encoded = encode_frame(message)?;
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}

fn to_io_error(err: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, err)
}
