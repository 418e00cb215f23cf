//! Forwarding state and admission control for an NDN firewall.

pub mod cuckoo;
pub mod face;
pub mod firewall;
pub mod forwarder;
pub mod name;
pub mod name_tree;
pub mod packets;
pub mod pit;
pub mod rules;
pub mod tlv;

pub use face::{Face, FaceError, FaceId, FaceKind, FaceRef, FaceRegistry, WeakFace};
pub use firewall::{Firewall, Mode, ParseModeError, Verdict};
pub use forwarder::{FaceErrorOutcome, Forwarder, InterestOutcome};
pub use name::{Name, NameError};
pub use name_tree::NameTree;
pub use packets::{Data, Interest, Packet};
pub use pit::{Pit, PitInsert, PitSnapshotEntry};
pub use rules::{RuleError, RuleKind, RuleSet};
pub use tlv::{TlvElement, TlvError};
