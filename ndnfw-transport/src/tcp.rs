//! TCP faces driven by tokio tasks.
//!
//! Each connection gets a reader task that frames incoming bytes into TLV
//! packets and a writer task that drains the face's outbound queue. Both
//! report to the event loop over a [`FaceEvent`] channel; the face handle
//! itself only holds the queue sender, so sending never blocks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use ndnfw_core::{Face, FaceError, FaceId, FaceKind};

use crate::framing::{FramingError, FramingLayer, PacketBuffer, TlvFramer, MAX_NDN_PACKET_SIZE};
use crate::{FaceEvent, TransportError};

const READ_CHUNK: usize = 16 * 1024;
const READ_BUFFER_LIMIT: usize = READ_CHUNK + MAX_NDN_PACKET_SIZE;

/// Holds one of a listener's connection slots until the connection ends.
#[derive(Debug)]
pub struct ConnectionSlot(#[allow(dead_code)] OwnedSemaphorePermit);

/// Face handle for a TCP connection.
#[derive(Debug, Clone)]
pub struct TcpFace {
    id: FaceId,
    kind: FaceKind,
    remote: SocketAddr,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl TcpFace {
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

impl Face for TcpFace {
    fn id(&self) -> FaceId {
        self.id
    }

    fn kind(&self) -> FaceKind {
        self.kind
    }

    fn remote(&self) -> String {
        format!("tcp://{}", self.remote)
    }

    fn send(&self, wire: &[u8]) -> Result<(), FaceError> {
        let framed = TlvFramer::default()
            .frame_packet(wire)
            .map_err(|e| FaceError::Failed {
                face: self.id,
                reason: e.to_string(),
            })?;
        self.outbound
            .send(framed)
            .map_err(|_| FaceError::Closed(self.id))
    }
}

/// Open the upstream connection, trying `attempts` times `delay` apart.
pub async fn connect_upstream(
    addr: SocketAddr,
    attempts: u32,
    delay: Duration,
) -> Result<TcpStream, TransportError> {
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                info!("Connected to upstream {}", addr);
                return Ok(stream);
            }
            Err(e) if attempt < attempts => {
                warn!("Upstream {} attempt {}/{} failed: {}", addr, attempt, attempts, e);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(source) => {
                return Err(TransportError::Connect {
                    addr,
                    attempts,
                    source,
                })
            }
        }
    }
}

/// Start the reader and writer tasks for `stream` and return its face.
pub fn spawn_face_io(
    stream: TcpStream,
    id: FaceId,
    kind: FaceKind,
    events: mpsc::UnboundedSender<FaceEvent>,
    slot: Option<ConnectionSlot>,
) -> Result<TcpFace, TransportError> {
    let remote = stream.peer_addr()?;
    let _ = stream.set_nodelay(true);
    let (reader, writer) = stream.into_split();
    let (outbound, queue) = mpsc::unbounded_channel();

    tokio::spawn(read_loop(reader, id, events.clone(), slot));
    tokio::spawn(write_loop(writer, id, queue, events));

    Ok(TcpFace {
        id,
        kind,
        remote,
        outbound,
    })
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    face: FaceId,
    events: mpsc::UnboundedSender<FaceEvent>,
    _slot: Option<ConnectionSlot>,
) {
    let reason = match pump_packets(&mut reader, face, &events).await {
        Ok(reason) => reason.to_string(),
        Err(e) => e.to_string(),
    };

    debug!("Face {} reader stopped: {}", face, reason);
    let _ = events.send(FaceEvent::Closed { face, reason });
}

/// Forward every complete packet read from `reader` until the stream ends.
async fn pump_packets(
    reader: &mut OwnedReadHalf,
    face: FaceId,
    events: &mpsc::UnboundedSender<FaceEvent>,
) -> Result<&'static str, TransportError> {
    // A leftover partial packet is below MAX_NDN_PACKET_SIZE, so a full
    // chunk always fits after extraction.
    let mut packets = PacketBuffer::new(Box::new(TlvFramer::default()), READ_BUFFER_LIMIT);
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let room = packets.remaining_capacity().min(READ_CHUNK);
        if room == 0 {
            return Err(FramingError::BufferOverflow.into());
        }

        let read = reader.read(&mut chunk[..room]).await?;
        if read == 0 {
            return Ok("connection closed by peer");
        }

        packets.add_data(&chunk[..read])?;
        for wire in packets.extract_packets()? {
            if events.send(FaceEvent::Packet { face, wire }).is_err() {
                return Ok("event loop stopped");
            }
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    face: FaceId,
    mut queue: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::UnboundedSender<FaceEvent>,
) {
    while let Some(bytes) = queue.recv().await {
        if let Err(e) = writer.write_all(&bytes).await {
            let _ = events.send(FaceEvent::Closed {
                face,
                reason: e.to_string(),
            });
            return;
        }
    }
    let _ = writer.shutdown().await;
    debug!("Face {} writer stopped", face);
}

/// Bind `addr` and accept connections in the background.
///
/// At most `max_connections` accepted connections are alive at a time;
/// further ones are closed right away. Returns the bound address and the
/// accept task.
pub async fn spawn_listener(
    addr: SocketAddr,
    listener: u64,
    max_connections: usize,
    events: mpsc::UnboundedSender<FaceEvent>,
) -> Result<(SocketAddr, JoinHandle<()>), TransportError> {
    let socket = TcpListener::bind(addr)
        .await
        .map_err(|source| TransportError::Bind { addr, source })?;
    let local = socket.local_addr()?;
    info!("Listening for downstream faces on {}", local);

    let slots = Arc::new(Semaphore::new(max_connections));
    let handle = tokio::spawn(async move {
        loop {
            let (stream, peer) = match socket.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept on {} failed: {}", local, e);
                    continue;
                }
            };

            let Ok(permit) = slots.clone().try_acquire_owned() else {
                warn!("Refusing {}: {} connections already open", peer, max_connections);
                drop(stream);
                continue;
            };

            let accepted = FaceEvent::Accepted {
                listener,
                stream,
                peer,
                slot: ConnectionSlot(permit),
            };
            if events.send(accepted).is_err() {
                break;
            }
        }
    });

    Ok((local, handle))
}
