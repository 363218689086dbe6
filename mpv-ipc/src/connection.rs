use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use serde_json::{Value, json};
use tokio::{
    io::BufReader,
    net::{UnixStream, unix::OwnedReadHalf},
    sync::oneshot,
};
use tracing::{debug, info, warn};

use crate::{
    error::{Error, Result},
    hub::{EventStream, Hub, StopHandle},
    message::{CommandRequest, encode_frame},
    pending::PendingTable,
    reader,
    writer::FrameWriter,
};

/// Client side of mpv's JSON IPC socket.
///
/// A `Connection` starts out closed. [`open`](Self::open) dials the socket
/// and starts a background reader; [`close`](Self::close) (or mpv going
/// away) ends the session, failing every outstanding [`call`](Self::call)
/// with [`Error::ConnectionClosed`] and ending every event stream. The same
/// `Connection` can be opened again afterwards.
///
/// Clones share the same underlying connection.
#[derive(Debug, Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

#[derive(Debug)]
struct Shared {
    socket_path: PathBuf,
    next_request_id: AtomicU64,
    next_subscriber_id: Arc<AtomicU64>,
    attached: Mutex<Option<Attached>>,
}

/// The currently open session and the signal that stops its reader.
#[derive(Debug)]
struct Attached {
    session: Arc<Session>,
    shutdown: oneshot::Sender<()>,
}

/// State owned by one open/close cycle.
#[derive(Debug)]
struct Session {
    writer: FrameWriter,
    pending: PendingTable,
    hub: Hub,
}

impl Connection {
    pub fn new(socket_path: impl AsRef<Path>) -> Self {
        Self {
            shared: Arc::new(Shared {
                socket_path: socket_path.as_ref().to_path_buf(),
                next_request_id: AtomicU64::new(1),
                next_subscriber_id: Arc::new(AtomicU64::new(1)),
                attached: Mutex::new(None),
            }),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.shared.socket_path
    }

    pub fn is_closed(&self) -> bool {
        self.shared.attached().is_none()
    }

    pub async fn open(&self) -> Result<()> {
        if !self.is_closed() {
            return Err(Error::AlreadyOpen);
        }

        let path = &self.shared.socket_path;
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| Error::ConnectFailed {
                path: path.clone(),
                source,
            })?;
        let (read_half, write_half) = stream.into_split();

        let session = Arc::new(Session {
            writer: FrameWriter::spawn(write_half),
            pending: PendingTable::default(),
            hub: Hub::with_id_counter(Arc::clone(&self.shared.next_subscriber_id)),
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        {
            let mut attached = self.shared.attached();
            if attached.is_some() {
                // Lost a race with a concurrent open; the new stream is dropped.
                session.hub.close();
                return Err(Error::AlreadyOpen);
            }
            *attached = Some(Attached {
                session: Arc::clone(&session),
                shutdown: shutdown_tx,
            });
        }

        info!(path = %path.display(), "connected to mpv");
        spawn_reader(
            BufReader::new(read_half),
            session,
            Arc::downgrade(&self.shared),
            shutdown_rx,
        );
        Ok(())
    }

    /// Closes the connection. Closing an already closed connection is a no-op.
    ///
    /// Outstanding calls and event streams are torn down by the reader once
    /// it observes the shutdown.
    pub async fn close(&self) -> Result<()> {
        let attached = self.shared.attached().take();
        let Some(Attached { session, shutdown }) = attached else {
            return Ok(());
        };

        info!(path = %self.shared.socket_path.display(), "closing connection");
        let _ = shutdown.send(());
        session.shutdown_writer().await
    }

    /// Sends a command and waits for mpv's reply.
    ///
    /// Returns the reply's `data` when mpv reports success, or
    /// [`Error::RemoteError`] with mpv's status otherwise. Dropping the
    /// returned future abandons the request; a late reply is discarded. A
    /// request that was already handed to the writer is still sent in full.
    pub async fn call<I, A>(&self, arguments: I) -> Result<Value>
    where
        I: IntoIterator<Item = A>,
        A: Into<Value>,
    {
        let session = self.shared.session().ok_or(Error::NotConnected)?;
        let command: Vec<Value> = arguments.into_iter().map(Into::into).collect();

        let id = self.shared.next_request_id.fetch_add(1, Ordering::Relaxed);
        session.call(id, command).await
    }

    pub async fn get_property(&self, name: &str) -> Result<Value> {
        self.call([json!("get_property"), json!(name)]).await
    }

    pub async fn set_property(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.call([json!("set_property"), json!(name), value.into()])
            .await
            .map(|_| ())
    }

    /// Starts listening for events.
    ///
    /// The stream receives every event read after this returns, until the
    /// [`StopHandle`] is used or the session ends. On a closed connection the
    /// stream is already over.
    pub fn subscribe(&self) -> (EventStream, StopHandle) {
        match self.shared.session() {
            Some(session) => session.hub.subscribe(),
            None => {
                let id = self
                    .shared
                    .next_subscriber_id
                    .fetch_add(1, Ordering::Relaxed);
                debug!(subscriber = id, "subscribing to a closed connection");
                (EventStream::ended(id), StopHandle::detached(id))
            }
        }
    }
}

impl Shared {
    fn attached(&self) -> MutexGuard<'_, Option<Attached>> {
        self.attached.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn session(&self) -> Option<Arc<Session>> {
        self.attached()
            .as_ref()
            .map(|attached| Arc::clone(&attached.session))
    }

    /// Detaches `session` unless a newer session already replaced it.
    fn detach(&self, session: &Arc<Session>) -> bool {
        let mut attached = self.attached();
        let current = attached
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(&current.session, session));
        if current {
            attached.take();
        }
        current
    }
}

impl Session {
    /// Reserves the slot for `id` before sending, so the reply cannot race
    /// ahead of its reservation.
    async fn call(&self, id: u64, command: Vec<Value>) -> Result<Value> {
        let mut slot = self.pending.reserve(id)?;

        let frame = encode_frame(&CommandRequest {
            command,
            request_id: id,
        })
        .map_err(Error::SendFailed)?;
        self.writer.send(frame).await?;
        debug!(request_id = id, "command sent");

        slot.wait().await?.into_value()
    }

    async fn shutdown_writer(&self) -> Result<()> {
        self.writer.shutdown().await
    }

    fn teardown(&self) {
        self.pending.close();
        self.hub.close();
    }
}

fn spawn_reader(
    reader: BufReader<OwnedReadHalf>,
    session: Arc<Session>,
    shared: Weak<Shared>,
    shutdown: oneshot::Receiver<()>,
) {
    tokio::spawn(async move {
        let exit = reader::run(reader, &session.pending, &session.hub, shutdown).await;
        debug!(?exit, "reader exited");

        session.teardown();
        if let Some(shared) = shared.upgrade() {
            if shared.detach(&session) {
                info!(path = %shared.socket_path.display(), "connection lost");
            }
        }
        if let Err(err) = session.shutdown_writer().await {
            warn!(error = ?err, "failed to shut down write half");
        }
    });
}
