use parlor_core::{CodecError, ConnectionState};
use std::time::Duration;
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Errors surfaced by the connection, inbound loop and session.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tungstenite::Error>,
    },

    #[error("timed out connecting to {url} after {timeout:?}")]
    ConnectTimeout { url: String, timeout: Duration },

    #[error("failed to send identity handshake: {0}")]
    Handshake(Box<tungstenite::Error>),

    #[error("failed to write frame: {0}")]
    Write(Box<tungstenite::Error>),

    #[error("failed to read frame: {0}")]
    Read(Box<tungstenite::Error>),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("session is not connected (state: {state})")]
    NotConnected { state: ConnectionState },
}

