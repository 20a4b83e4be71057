pub mod connection;
pub mod error;
pub mod inbound;
pub mod reconnect;
pub mod session;
pub mod testkit;

pub use connection::{Connection, FrameReader, FrameWriter};
pub use error::ClientError;
pub use inbound::{Dispatch, InboundLoop, StopReason};
pub use reconnect::ReconnectPolicy;
pub use session::{Session, SessionConfig};

/// Server the desktop client talks to when nothing else is configured.
pub const DEFAULT_SERVER_URL: &str = "ws://localhost:8443/ws";
