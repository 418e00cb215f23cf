use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use log::{debug, error, info, warn};
use tokio::net::UdpSocket;
use tokio::signal;
use tokio::sync::mpsc;

use ndnfw_core::packets::Packet;
use ndnfw_core::{FaceErrorOutcome, FaceId, FaceKind, FaceRef, FaceRegistry, Firewall, Forwarder, Pit};
use ndnfw_transport::{connect_upstream, spawn_face_io, spawn_listener, FaceEvent};

use crate::config::Config;
use crate::control;

const CONTROL_BUFFER_SIZE: usize = 65536;

/// Owns every face and the forwarding state; driven by [`Daemon::run`].
pub struct Reactor {
    forwarder: Forwarder,
    registry: FaceRegistry,
    events: mpsc::UnboundedSender<FaceEvent>,
}

impl Reactor {
    pub fn new(forwarder: Forwarder, registry: FaceRegistry, events: mpsc::UnboundedSender<FaceEvent>) -> Self {
        Self {
            forwarder,
            registry,
            events,
        }
    }

    pub fn forwarder_mut(&mut self) -> &mut Forwarder {
        &mut self.forwarder
    }

    pub fn registry(&self) -> &FaceRegistry {
        &self.registry
    }

    /// Process one transport event; an error means the daemon must stop.
    pub fn on_event(&mut self, event: FaceEvent) -> Result<()> {
        match event {
            FaceEvent::Accepted {
                listener,
                stream,
                peer,
                slot,
            } => {
                let id = self.registry.allocate_id();
                let kind = FaceKind::Multi { listener };
                match spawn_face_io(stream, id, kind, self.events.clone(), Some(slot)) {
                    Ok(face) => {
                        info!("New face {} from {}", id, peer);
                        self.registry.add(Rc::new(face));
                    }
                    Err(e) => warn!("Could not set up face for {}: {}", peer, e),
                }
                Ok(())
            }
            FaceEvent::Packet { face, wire } => {
                self.on_packet(face, &wire);
                Ok(())
            }
            FaceEvent::Closed { face, reason } => self.on_closed(face, &reason),
        }
    }

    pub fn on_packet(&mut self, face_id: FaceId, wire: &[u8]) {
        let Some(face) = self.registry.get(face_id).cloned() else {
            debug!("Packet from unknown face {}", face_id);
            return;
        };

        match Packet::decode(wire) {
            Ok(Packet::Interest(interest)) => {
                let outcome = self.forwarder.on_interest(&face, &interest, wire);
                debug!("Interest {} from face {}: {:?}", interest.name, face_id, outcome);
            }
            Ok(Packet::Data(data)) => {
                self.forwarder.on_data(&face, &data, wire);
            }
            Err(e) => warn!("Dropping undecodable packet from face {}: {}", face_id, e),
        }
    }

    pub fn on_closed(&mut self, face_id: FaceId, reason: &str) -> Result<()> {
        let Some(face) = self.registry.remove(face_id) else {
            return Ok(());
        };
        info!("Face {} ({}) closed: {}", face_id, face.remote(), reason);

        match self.forwarder.on_face_error(face_id) {
            FaceErrorOutcome::Fatal => bail!("lost upstream connection: {}", reason),
            FaceErrorOutcome::Ignored => Ok(()),
        }
    }
}

pub struct Daemon {
    config: Config,
}

impl Daemon {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Connect upstream, open the listeners and run until Ctrl-C or a fatal
    /// face error.
    pub async fn run(self) -> Result<()> {
        let config = self.config;
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut registry = FaceRegistry::new();

        let upstream_addr = config.upstream_addr()?;
        let stream = connect_upstream(upstream_addr, config.network.connect_attempts, config.connect_delay())
            .await
            .context("failed to reach the upstream forwarder")?;
        let upstream_id = registry.allocate_id();
        let upstream: FaceRef = Rc::new(spawn_face_io(
            stream,
            upstream_id,
            FaceKind::Single,
            events_tx.clone(),
            None,
        )?);
        registry.add(upstream.clone());
        info!("Upstream face {} is {}", upstream_id, upstream.remote());

        let local = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.network.local_port));
        let listener_id = registry.allocate_listener_id();
        let (_, accept_task) = spawn_listener(
            local,
            listener_id,
            config.network.max_connections,
            events_tx.clone(),
        )
        .await?;

        let command_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.network.command_port));
        let commands = UdpSocket::bind(command_addr)
            .await
            .with_context(|| format!("failed to bind command port {}", command_addr))?;
        info!("Listening for commands on {}", command_addr);

        let firewall = Firewall::new(
            config.firewall.mode,
            config.firewall.whitelist_size,
            config.firewall.blacklist_size,
        );
        let forwarder = Forwarder::new(firewall, Pit::new(config.pit.size), upstream);
        let mut reactor = Reactor::new(forwarder, registry, events_tx);

        let shutdown = signal::ctrl_c();
        tokio::pin!(shutdown);
        let mut buffer = vec![0u8; CONTROL_BUFFER_SIZE];

        let result = loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    if let Err(e) = reactor.on_event(event) {
                        break Err(e);
                    }
                }
                received = commands.recv_from(&mut buffer) => {
                    match received {
                        Ok((len, peer)) => {
                            for reply in control::handle_command(reactor.forwarder_mut(), &buffer[..len]) {
                                if let Err(e) = commands.send_to(reply.as_bytes(), peer).await {
                                    warn!("Failed to reply to {}: {}", peer, e);
                                }
                            }
                        }
                        Err(e) => error!("Command socket error: {}", e),
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutting down NDN firewall");
                    break Ok(());
                }
            }
        };

        accept_task.abort();
        info!("Closing {} faces", reactor.registry().len());
        result
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use ndnfw_core::{Data, Face, FaceError, Interest, Mode, Name, RuleKind};

    struct MockFace {
        id: FaceId,
        sent: RefCell<Vec<Vec<u8>>>,
    }

    impl MockFace {
        fn new(id: FaceId) -> Rc<Self> {
            Rc::new(Self {
                id,
                sent: RefCell::new(Vec::new()),
            })
        }
    }

    impl Face for MockFace {
        fn id(&self) -> FaceId {
            self.id
        }

        fn kind(&self) -> FaceKind {
            FaceKind::Multi { listener: 1 }
        }

        fn remote(&self) -> String {
            format!("mock://{}", self.id)
        }

        fn send(&self, wire: &[u8]) -> Result<(), FaceError> {
            self.sent.borrow_mut().push(wire.to_vec());
            Ok(())
        }
    }

    struct Fixture {
        reactor: Reactor,
        upstream: Rc<MockFace>,
        downstream: Rc<MockFace>,
    }

    fn fixture() -> Fixture {
        let mut registry = FaceRegistry::new();
        let upstream = MockFace::new(registry.allocate_id());
        let downstream = MockFace::new(registry.allocate_id());
        registry.add(upstream.clone());
        registry.add(downstream.clone());

        let firewall = Firewall::new(Mode::Accept, 10, 10);
        let forwarder = Forwarder::new(firewall, Pit::new(10), upstream.clone());
        let (tx, _rx) = mpsc::unbounded_channel();
        Fixture {
            reactor: Reactor::new(forwarder, registry, tx),
            upstream,
            downstream,
        }
    }

    fn interest(uri: &str) -> Vec<u8> {
        Interest::new(Name::from_uri(uri).unwrap())
            .with_nonce(3)
            .encode()
            .unwrap()
    }

    #[test]
    fn test_interest_and_data_round_trip() {
        let mut fx = fixture();
        let request = interest("/movie/1");
        fx.reactor.on_packet(fx.downstream.id, &request);
        assert_eq!(*fx.upstream.sent.borrow(), vec![request]);

        let reply = Data::new(Name::from_uri("/movie/1").unwrap(), b"frame".to_vec())
            .encode()
            .unwrap();
        fx.reactor.on_packet(fx.upstream.id, &reply);
        assert_eq!(*fx.downstream.sent.borrow(), vec![reply]);
    }

    #[test]
    fn test_blacklisted_interest_not_forwarded() {
        let mut fx = fixture();
        fx.reactor
            .forwarder_mut()
            .firewall_mut()
            .append(RuleKind::Blacklist, "/movie")
            .unwrap();

        fx.reactor.on_packet(fx.downstream.id, &interest("/movie/1"));
        assert!(fx.upstream.sent.borrow().is_empty());
    }

    #[test]
    fn test_garbage_and_unknown_faces_are_ignored() {
        let mut fx = fixture();
        fx.reactor.on_packet(fx.downstream.id, &[0x05, 0x02, 0xFF, 0xFF]);
        fx.reactor.on_packet(99, &interest("/a"));
        assert!(fx.upstream.sent.borrow().is_empty());
    }

    #[test]
    fn test_downstream_close_is_not_fatal() {
        let mut fx = fixture();
        let downstream = fx.downstream.id;
        assert!(fx.reactor.on_closed(downstream, "reset").is_ok());
        assert_eq!(fx.reactor.registry().len(), 1);
        assert!(fx.reactor.on_closed(downstream, "reset").is_ok());
    }

    #[test]
    fn test_upstream_close_is_fatal() {
        let mut fx = fixture();
        let upstream = fx.upstream.id;
        assert!(fx.reactor.on_closed(upstream, "eof").is_err());
    }
}
