use std::io;
use std::net::SocketAddr;

use tokio::net::TcpStream;

use ndnfw_core::FaceId;

pub mod framing;
pub mod tcp;

pub use framing::{FramingError, FramingLayer, PacketBuffer, TlvFramer, MAX_NDN_PACKET_SIZE};
pub use tcp::{connect_upstream, spawn_face_io, spawn_listener, ConnectionSlot, TcpFace};

/// Notifications from the socket tasks to the event loop.
#[derive(Debug)]
pub enum FaceEvent {
    /// A listener accepted a connection that still needs a face.
    Accepted {
        listener: u64,
        stream: TcpStream,
        peer: SocketAddr,
        slot: ConnectionSlot,
    },
    /// One complete TLV packet arrived on a face.
    Packet { face: FaceId, wire: Vec<u8> },
    /// The connection behind a face is gone.
    Closed { face: FaceId, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("could not connect to {addr} after {attempts} attempts: {source}")]
    Connect {
        addr: SocketAddr,
        attempts: u32,
        source: io::Error,
    },
    #[error("could not bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Framing error: {0}")]
    Framing(#[from] FramingError),
}
