//! Write side of a session.
//!
//! Frames are handed to a dedicated task over a channel and written there,
//! so once a frame is queued it reaches the socket whole even if the caller
//! that queued it gives up mid-write.

use std::io;

use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::{mpsc, oneshot},
};
use tracing::debug;

use crate::error::{Error, Result};

#[derive(Debug)]
enum WriterCommand {
    Frame {
        bytes: Vec<u8>,
        done: oneshot::Sender<io::Result<()>>,
    },
    Shutdown {
        done: oneshot::Sender<io::Result<()>>,
    },
}

/// Handle to a session's writer task.
#[derive(Debug)]
pub(crate) struct FrameWriter {
    commands: mpsc::UnboundedSender<WriterCommand>,
}

impl FrameWriter {
    /// Starts the writer task, which owns `sink` until shutdown or until
    /// every handle is dropped.
    pub(crate) fn spawn<W>(sink: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (commands, inbox) = mpsc::unbounded_channel();
        tokio::spawn(run(sink, inbox));
        Self { commands }
    }

    /// Queues an encoded frame (terminator included) and waits for it to be
    /// flushed.
    pub(crate) async fn send(&self, bytes: Vec<u8>) -> Result<()> {
        let (done, written) = oneshot::channel();
        self.commands
            .send(WriterCommand::Frame { bytes, done })
            .map_err(|_| Error::ConnectionClosed)?;

        written
            .await
            .map_err(|_| Error::ConnectionClosed)?
            .map_err(Error::SendFailed)
    }

    /// Shuts down the write half after every frame queued before this call
    /// has been written. A writer that already stopped is not an error.
    pub(crate) async fn shutdown(&self) -> Result<()> {
        let (done, finished) = oneshot::channel();
        if self.commands.send(WriterCommand::Shutdown { done }).is_err() {
            return Ok(());
        }

        match finished.await {
            Ok(Ok(())) | Err(_) => Ok(()),
            Ok(Err(err)) if err.kind() == io::ErrorKind::NotConnected => Ok(()),
            Ok(Err(err)) => Err(err.into()),
        }
    }
}

async fn run<W>(mut sink: W, mut inbox: mpsc::UnboundedReceiver<WriterCommand>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = inbox.recv().await {
        match command {
            WriterCommand::Frame { bytes, done } => {
                let result = write_all(&mut sink, &bytes).await;
                if let Err(err) = &result {
                    debug!(error = ?err, "failed to write frame");
                }
                // The caller may have stopped waiting.
                let _ = done.send(result);
            }
            WriterCommand::Shutdown { done } => {
                let _ = done.send(sink.shutdown().await);
                break;
            }
        }
    }
    debug!("writer stopped");
}

async fn write_all<W>(sink: &mut W, bytes: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.write_all(bytes).await?;
    sink.flush().await
}
