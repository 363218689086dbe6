//! Async client for mpv's JSON IPC socket.
//!
//! mpv speaks newline-delimited JSON over a Unix socket: commands go out
//! tagged with a `request_id`, replies come back carrying the same id, and
//! unsolicited events are interleaved with the replies on the same stream.
//! Each module focuses on one responsibility:
//!
//! - [`connection`] owns the socket, hands out request ids, and exposes
//!   `open`/`close`/`call`/`subscribe`.
//! - `reader` runs one task per open connection that splits the stream into
//!   frames and routes replies to their callers and events to subscribers.
//! - `writer` runs one task per open connection that owns the write half,
//!   so a queued frame is always written whole.
//! - `pending` is the table of calls waiting for a reply.
//! - [`hub`] fans events out to subscribers from a single coordinator task.
//! - [`message`] provides the wire types plus helpers for line-framed reads
//!   and writes.
//! - [`cli`] parses the command-line interface of the `mpv-ipc` binary.
//!
//! ```no_run
//! # async fn demo() -> mpv_ipc::Result<()> {
//! let connection = mpv_ipc::Connection::new("/tmp/mpv_rpc");
//! connection.open().await?;
//! let (mut events, stop) = connection.subscribe();
//! connection.set_property("pause", true).await?;
//! let paused = connection.get_property("pause").await?;
//! while let Some(event) = events.next_event().await {
//!     println!("{} {paused}", event.name);
//! }
//! stop.stop();
//! connection.close().await
//! # }
//! ```

pub mod cli;
pub mod connection;
pub mod error;
pub mod hub;
pub mod message;
mod pending;
mod reader;
mod writer;

pub use connection::Connection;
pub use error::{Error, Result};
pub use hub::{EventStream, Hub, StopHandle, SubscriberId};
pub use message::{CommandResult, Event};
