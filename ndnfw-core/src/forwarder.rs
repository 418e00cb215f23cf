//! Packet processing between downstream faces and the single upstream.
//!
//! The forwarder performs no I/O of its own: the reactor hands it decoded
//! packets together with their original wire bytes and it answers through
//! [`Face::send`](crate::face::Face::send), which only queues.

use log::{debug, error, info};

use crate::face::{FaceId, FaceRef};
use crate::firewall::{Firewall, Verdict};
use crate::packets::{Data, Interest};
use crate::pit::{Pit, PitInsert};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestOutcome {
    /// Sent upstream.
    Forwarded,
    /// Recorded in the PIT without a new upstream transmission.
    Suppressed,
    /// Lifetime below the PIT minimum; nothing recorded.
    Rejected,
    /// Denied by the firewall.
    Dropped,
    /// Arrived from the upstream face.
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceErrorOutcome {
    /// The upstream is gone; the process cannot continue.
    Fatal,
    Ignored,
}

pub struct Forwarder {
    firewall: Firewall,
    pit: Pit,
    upstream: FaceRef,
}

impl Forwarder {
    pub fn new(firewall: Firewall, pit: Pit, upstream: FaceRef) -> Self {
        Self {
            firewall,
            pit,
            upstream,
        }
    }

    pub fn firewall(&self) -> &Firewall {
        &self.firewall
    }

    pub fn firewall_mut(&mut self) -> &mut Firewall {
        &mut self.firewall
    }

    pub fn pit(&self) -> &Pit {
        &self.pit
    }

    pub fn pit_mut(&mut self) -> &mut Pit {
        &mut self.pit
    }

    pub fn upstream_id(&self) -> FaceId {
        self.upstream.id()
    }

    pub fn on_interest(&mut self, face: &FaceRef, interest: &Interest, wire: &[u8]) -> InterestOutcome {
        if face.id() == self.upstream.id() {
            debug!("ignoring Interest {} from upstream", interest.name);
            return InterestOutcome::Ignored;
        }

        if self.firewall.classify(&interest.name) == Verdict::Drop {
            info!("the Interest name {} was dropped", interest.name);
            return InterestOutcome::Dropped;
        }

        match self.pit.insert(&interest.name, interest.lifetime(), face) {
            None => InterestOutcome::Rejected,
            Some(PitInsert::Suppress) => InterestOutcome::Suppressed,
            Some(PitInsert::Forward) => {
                if let Err(e) = self.upstream.send(wire) {
                    error!("failed to forward {} upstream: {}", interest.name, e);
                }
                InterestOutcome::Forwarded
            }
        }
    }

    /// Deliver Data from the upstream to every waiting face. Returns the
    /// number of faces it was handed to.
    pub fn on_data(&mut self, face: &FaceRef, data: &Data, wire: &[u8]) -> usize {
        if face.id() != self.upstream.id() {
            debug!("ignoring Data {} from downstream face {}", data.name, face.id());
            return 0;
        }

        let mut delivered = 0;
        for requester in self.pit.get(&data.name) {
            match requester.send(wire) {
                Ok(()) => delivered += 1,
                Err(e) => error!("failed to deliver {} to face {}: {}", data.name, requester.id(), e),
            }
        }
        debug!("{} delivered to {} faces", data.name, delivered);
        delivered
    }

    pub fn on_face_error(&mut self, face_id: FaceId) -> FaceErrorOutcome {
        if face_id == self.upstream.id() {
            error!("upstream face {} failed", face_id);
            FaceErrorOutcome::Fatal
        } else {
            error!("downstream face {} failed", face_id);
            FaceErrorOutcome::Ignored
        }
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;
    use crate::face::testing::RecordingFace;
    use crate::face::FaceKind;
    use crate::firewall::Mode;
    use crate::name::Name;
    use crate::rules::RuleKind;

    struct Fixture {
        forwarder: Forwarder,
        upstream: Rc<RecordingFace>,
    }

    fn fixture(mode: Mode) -> Fixture {
        let upstream = RecordingFace::with_kind(1, FaceKind::Single);
        let as_face: FaceRef = upstream.clone();
        Fixture {
            forwarder: Forwarder::new(Firewall::new(mode, 100, 100), Pit::new(100), as_face),
            upstream,
        }
    }

    fn interest(uri: &str) -> Interest {
        Interest::new(Name::from_uri(uri).unwrap())
    }

    #[test]
    fn test_interest_forwarded_once() {
        let mut fx = fixture(Mode::Accept);
        let a: FaceRef = RecordingFace::new(2);
        let b: FaceRef = RecordingFace::new(3);
        let packet = interest("/video/1");

        assert_eq!(fx.forwarder.on_interest(&a, &packet, b"one"), InterestOutcome::Forwarded);
        assert_eq!(fx.forwarder.on_interest(&b, &packet, b"two"), InterestOutcome::Suppressed);
        assert_eq!(*fx.upstream.sent.borrow(), vec![b"one".to_vec()]);
    }

    #[test]
    fn test_dropped_interest_is_not_recorded() {
        let mut fx = fixture(Mode::Accept);
        fx.forwarder
            .firewall_mut()
            .append(RuleKind::Blacklist, "/private")
            .unwrap();
        let a: FaceRef = RecordingFace::new(2);

        let outcome = fx.forwarder.on_interest(&a, &interest("/private/key"), b"x");
        assert_eq!(outcome, InterestOutcome::Dropped);
        assert!(fx.forwarder.pit().is_empty());
        assert_eq!(fx.upstream.sent_count(), 0);
    }

    #[test]
    fn test_short_lifetime_rejected() {
        let mut fx = fixture(Mode::Accept);
        let a: FaceRef = RecordingFace::new(2);
        let packet = interest("/n").with_lifetime(Duration::from_millis(2));

        assert_eq!(fx.forwarder.on_interest(&a, &packet, b"x"), InterestOutcome::Rejected);
        assert_eq!(fx.upstream.sent_count(), 0);
    }

    #[test]
    fn test_data_reaches_all_requesters() {
        let mut fx = fixture(Mode::Accept);
        let a = RecordingFace::new(2);
        let b = RecordingFace::new(3);
        let (a_face, b_face): (FaceRef, FaceRef) = (a.clone(), b.clone());
        let upstream: FaceRef = fx.upstream.clone();

        fx.forwarder.on_interest(&a_face, &interest("/v"), b"i");
        fx.forwarder.on_interest(&b_face, &interest("/v/1"), b"i");

        let data = Data::new(Name::from_uri("/v/1").unwrap(), b"payload".to_vec());
        assert_eq!(fx.forwarder.on_data(&upstream, &data, b"d"), 2);
        assert_eq!(a.sent_count(), 1);
        assert_eq!(b.sent_count(), 1);

        assert_eq!(fx.forwarder.on_data(&upstream, &data, b"d"), 0);
    }

    #[test]
    fn test_send_failure_is_skipped() {
        let mut fx = fixture(Mode::Accept);
        let a = RecordingFace::new(2);
        let b = RecordingFace::new(3);
        let (a_face, b_face): (FaceRef, FaceRef) = (a.clone(), b.clone());
        let upstream: FaceRef = fx.upstream.clone();

        fx.forwarder.on_interest(&a_face, &interest("/v"), b"i");
        fx.forwarder.on_interest(&b_face, &interest("/v"), b"i");
        a.fail.set(true);

        let data = Data::new(Name::from_uri("/v").unwrap(), Vec::new());
        assert_eq!(fx.forwarder.on_data(&upstream, &data, b"d"), 1);
        assert_eq!(b.sent_count(), 1);
    }

    #[test]
    fn test_wrong_direction_is_ignored() {
        let mut fx = fixture(Mode::Accept);
        let upstream: FaceRef = fx.upstream.clone();
        let a: FaceRef = RecordingFace::new(2);

        assert_eq!(fx.forwarder.on_interest(&upstream, &interest("/n"), b"i"), InterestOutcome::Ignored);
        fx.forwarder.on_interest(&a, &interest("/n"), b"i");
        let data = Data::new(Name::from_uri("/n").unwrap(), Vec::new());
        assert_eq!(fx.forwarder.on_data(&a, &data, b"d"), 0);
        assert_eq!(fx.forwarder.pit().find(&data.name).unwrap().face_ids(), vec![2]);
    }

    #[test]
    fn test_face_error_severity() {
        let mut fx = fixture(Mode::Drop);
        assert_eq!(fx.forwarder.on_face_error(1), FaceErrorOutcome::Fatal);
        assert_eq!(fx.forwarder.on_face_error(9), FaceErrorOutcome::Ignored);
    }
}
