//! Network layer for promptdj.
//!
//! This crate owns the wire protocol spoken with the generation service,
//! the framing used by the bundled TCP transport, and the session lifecycle
//! (`SessionConnection`) the playback engine drives.

pub mod connection;
pub mod framing;
pub mod protocol;
pub mod transport;

pub use connection::{ConnectionNotice, ConnectionState, PendingConnect, SessionConnection};
pub use protocol::{
    AudioChunk, ClientMessage, ControlChanges, Inbound, PlaybackControl, ServerContent,
    ServerMessage, SessionEvent, SessionId, WeightedPrompt,
};
pub use transport::{Connector, Session, TcpConnector};
