//! A scripted stand-in for mpv's IPC server.

#![allow(dead_code)]

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use mpv_ipc::{
    Connection,
    message::{CommandRequest, read_frame, write_frame},
};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{
        UnixListener,
        unix::{OwnedReadHalf, OwnedWriteHalf},
    },
    time::{sleep, timeout},
};

pub const WAIT: Duration = Duration::from_secs(2);

pub struct FakeMpv {
    listener: UnixListener,
    path: PathBuf,
    _dir: TempDir,
}

impl FakeMpv {
    pub fn bind() -> Result<Self> {
        let dir = tempfile::tempdir().context("failed to create socket dir")?;
        let path = dir.path().join("mpv.sock");
        let listener = UnixListener::bind(&path)
            .with_context(|| format!("failed to bind {}", path.display()))?;
        Ok(Self {
            listener,
            path,
            _dir: dir,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn accept(&self) -> Result<PeerSession> {
        let (stream, _) = timeout(WAIT, self.listener.accept())
            .await
            .context("timed out waiting for the client to connect")??;
        let (reader, writer) = stream.into_split();
        Ok(PeerSession {
            reader: BufReader::new(reader),
            writer,
        })
    }

    /// Opens `connection` against this peer and returns the server side.
    pub async fn open(&self, connection: &Connection) -> Result<PeerSession> {
        connection.open().await.context("failed to open connection")?;
        self.accept().await
    }
}

pub struct PeerSession {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl PeerSession {
    pub async fn next_request(&mut self) -> Result<CommandRequest> {
        let frame = timeout(WAIT, read_frame(&mut self.reader))
            .await
            .context("timed out waiting for a command")??
            .context("client closed the connection")?;
        serde_json::from_slice(&frame).context("client sent an invalid command frame")
    }

    /// Waits for the client to close its side of the socket.
    pub async fn expect_eof(&mut self) -> Result<()> {
        let frame = timeout(WAIT, read_frame(&mut self.reader))
            .await
            .context("timed out waiting for the client to hang up")??;
        anyhow::ensure!(frame.is_none(), "unexpected frame before EOF: {frame:?}");
        Ok(())
    }

    pub async fn send(&mut self, frame: &Value) -> Result<()> {
        write_frame(&mut self.writer, frame).await?;
        Ok(())
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.writer.write_all(bytes).await?;
        self.writer.flush().await?;
        Ok(())
    }

    pub async fn reply(&mut self, request_id: u64, status: &str, data: Value) -> Result<()> {
        self.send(&json!({
            "error": status,
            "data": data,
            "request_id": request_id,
        }))
        .await
    }

    pub async fn succeed(&mut self, request_id: u64, data: Value) -> Result<()> {
        self.reply(request_id, "success", data).await
    }
}

pub async fn wait_until_closed(connection: &Connection) -> Result<()> {
    timeout(WAIT, async {
        while !connection.is_closed() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .context("connection never noticed the peer going away")
}
