//! Read side of a session: splits the stream into frames and routes each one
//! to the caller waiting on it or to the event subscribers.

use tokio::{io::AsyncBufRead, select, sync::oneshot};
use tracing::{debug, info, trace, warn};

use crate::{
    hub::Hub,
    message::{Frame, read_frame},
    pending::PendingTable,
};

/// Why the read loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReadExit {
    Shutdown,
    EndOfStream,
    Failed,
}

/// Consumes frames until the stream ends, fails, or `shutdown` resolves
/// (fired or dropped).
pub(crate) async fn run<R>(
    mut reader: R,
    pending: &PendingTable,
    hub: &Hub,
    mut shutdown: oneshot::Receiver<()>,
) -> ReadExit
where
    R: AsyncBufRead + Unpin,
{
    loop {
        select! {
            _ = &mut shutdown => {
                debug!("reader stopping, connection closed locally");
                return ReadExit::Shutdown;
            }
            frame = read_frame(&mut reader) => match frame {
                Ok(Some(frame)) => route(&frame, pending, hub),
                Ok(None) => {
                    info!("mpv closed the connection");
                    return ReadExit::EndOfStream;
                }
                Err(err) => {
                    warn!(error = ?err, "failed to read from mpv");
                    return ReadExit::Failed;
                }
            }
        }
    }
}

fn route(frame: &[u8], pending: &PendingTable, hub: &Hub) {
    trace!(frame = %String::from_utf8_lossy(frame), "frame received");

    match Frame::classify(frame) {
        Some(Frame::Result(result)) => {
            let id = result.id;
            if pending.deliver(result) {
                debug!(request_id = id, "result delivered");
            } else {
                debug!(request_id = id, "no caller waiting for result, discarding");
            }
        }
        Some(Frame::Event(event)) => {
            debug!(event = %event.name, "event received");
            if !hub.broadcast(event) {
                debug!("hub already closed, event dropped");
            }
        }
        None => trace!("discarding unrecognised frame"),
    }
}
