//! Error types for the mpv IPC client

use std::{io, path::PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("connection is already open")]
    AlreadyOpen,

    #[error("connection is not open")]
    NotConnected,

    #[error("connection closed before a result arrived")]
    ConnectionClosed,

    #[error("can't connect to mpv's socket at {path}: {source}")]
    ConnectFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("can't send command: {0}")]
    SendFailed(#[source] io::Error),

    #[error("mpv error: {status}")]
    RemoteError { status: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
