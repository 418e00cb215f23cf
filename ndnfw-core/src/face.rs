use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

pub type FaceId = u64;

/// Owning handle shared by the registry and the forwarder.
pub type FaceRef = Rc<dyn Face>;

/// Non-owning handle kept by PIT entries.
pub type WeakFace = Weak<dyn Face>;

/// How a face came into existence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaceKind {
    /// A connection opened by this process, e.g. the upstream.
    Single,
    /// A connection accepted by the listener with the given id.
    Multi { listener: u64 },
}

impl fmt::Display for FaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaceKind::Single => write!(f, "single"),
            FaceKind::Multi { listener } => write!(f, "multi(listener {})", listener),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FaceError {
    #[error("face {0} is closed")]
    Closed(FaceId),
    #[error("face {face} failed: {reason}")]
    Failed { face: FaceId, reason: String },
}

/// An endpoint that packets can be sent to.
///
/// `send` must not block: implementations queue the bytes for an I/O task.
pub trait Face {
    fn id(&self) -> FaceId;

    fn kind(&self) -> FaceKind;

    /// Human readable remote endpoint, e.g. `tcp://127.0.0.1:6363`.
    fn remote(&self) -> String;

    fn send(&self, wire: &[u8]) -> Result<(), FaceError>;
}

/// Allocates face and listener ids and owns the live faces.
///
/// Removing a face here drops the last strong handle, which is how PIT
/// entries learn that a requester went away.
#[derive(Default)]
pub struct FaceRegistry {
    next_face_id: FaceId,
    next_listener_id: u64,
    faces: BTreeMap<FaceId, FaceRef>,
}

impl FaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_id(&mut self) -> FaceId {
        self.next_face_id += 1;
        self.next_face_id
    }

    pub fn allocate_listener_id(&mut self) -> u64 {
        self.next_listener_id += 1;
        self.next_listener_id
    }

    pub fn add(&mut self, face: FaceRef) {
        self.faces.insert(face.id(), face);
    }

    pub fn get(&self, id: FaceId) -> Option<&FaceRef> {
        self.faces.get(&id)
    }

    pub fn remove(&mut self, id: FaceId) -> Option<FaceRef> {
        self.faces.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FaceRef> {
        self.faces.values()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::cell::{Cell, RefCell};

    use super::*;

    /// Face that records everything sent to it.
    pub struct RecordingFace {
        id: FaceId,
        kind: FaceKind,
        pub sent: RefCell<Vec<Vec<u8>>>,
        pub fail: Cell<bool>,
    }

    impl RecordingFace {
        pub fn new(id: FaceId) -> Rc<Self> {
            Self::with_kind(id, FaceKind::Multi { listener: 1 })
        }

        pub fn with_kind(id: FaceId, kind: FaceKind) -> Rc<Self> {
            Rc::new(Self {
                id,
                kind,
                sent: RefCell::new(Vec::new()),
                fail: Cell::new(false),
            })
        }

        pub fn sent_count(&self) -> usize {
            self.sent.borrow().len()
        }
    }

    impl Face for RecordingFace {
        fn id(&self) -> FaceId {
            self.id
        }

        fn kind(&self) -> FaceKind {
            self.kind
        }

        fn remote(&self) -> String {
            format!("test://{}", self.id)
        }

        fn send(&self, wire: &[u8]) -> Result<(), FaceError> {
            if self.fail.get() {
                return Err(FaceError::Closed(self.id));
            }
            self.sent.borrow_mut().push(wire.to_vec());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingFace;
    use super::*;

    #[test]
    fn test_ids_are_sequential_per_registry() {
        let mut registry = FaceRegistry::new();
        assert_eq!(registry.allocate_id(), 1);
        assert_eq!(registry.allocate_id(), 2);
        assert_eq!(registry.allocate_listener_id(), 1);

        let other = FaceRegistry::new();
        assert!(other.is_empty());
    }

    #[test]
    fn test_remove_drops_last_strong_handle() {
        let mut registry = FaceRegistry::new();
        let face: FaceRef = RecordingFace::new(registry.allocate_id());
        let weak: WeakFace = Rc::downgrade(&face);
        registry.add(face);
        assert_eq!(registry.len(), 1);
        assert!(weak.upgrade().is_some());

        registry.remove(1);
        assert!(weak.upgrade().is_none());
    }
}
