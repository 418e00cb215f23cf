//! Pending Interest Table.
//!
//! Entries live in a [`NameTree`] so Data can be matched against every
//! pending ancestor of its name. A recency list orders entries by their last
//! insert or refresh; when the table grows past its capacity the stalest
//! entry is evicted. Expiry is lazy: nothing scans for expired entries, they
//! are discovered when touched.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::{Duration, Instant};

use log::debug;
use lru::LruCache;
use serde::Serialize;

use crate::face::{FaceId, FaceRef, WeakFace};
use crate::name::Name;
use crate::name_tree::NameTree;

/// Interests with a shorter lifetime are not recorded.
pub const MINIMAL_INTEREST_LIFETIME: Duration = Duration::from_millis(5);

/// Window during which a repeated Interest is not forwarded again.
pub const RETRANSMISSION_TIME: Duration = Duration::from_millis(250);

pub const DEFAULT_PIT_SIZE: usize = 1_000_000;

/// What the caller should do with an accepted Interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitInsert {
    /// Send the Interest upstream.
    Forward,
    /// An identical Interest was forwarded recently; only record the face.
    Suppress,
}

#[derive(Debug)]
pub struct PitEntry {
    faces: BTreeMap<FaceId, WeakFace>,
    keep_until: Instant,
    last_update: Instant,
}

impl PitEntry {
    fn new(face: &FaceRef, lifetime: Duration, now: Instant) -> Self {
        let mut faces = BTreeMap::new();
        faces.insert(face.id(), Rc::downgrade(face));
        Self {
            faces,
            keep_until: now + lifetime,
            last_update: now,
        }
    }

    /// Record another requester. Returns whether the Interest should be
    /// retransmitted upstream.
    fn add_face(&mut self, face: &FaceRef, lifetime: Duration, now: Instant) -> bool {
        self.faces.insert(face.id(), Rc::downgrade(face));
        self.keep_until = now + lifetime;
        let retransmit = self.last_update + RETRANSMISSION_TIME < now;
        self.last_update = now;
        retransmit
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Instant::now())
    }

    pub fn is_valid_at(&self, now: Instant) -> bool {
        self.keep_until > now
    }

    /// Ids of the faces still waiting on this entry.
    pub fn face_ids(&self) -> Vec<FaceId> {
        self.faces
            .iter()
            .filter(|(_, face)| face.strong_count() > 0)
            .map(|(&id, _)| id)
            .collect()
    }

    fn take_faces(&mut self) -> BTreeMap<FaceId, WeakFace> {
        std::mem::take(&mut self.faces)
    }
}

/// One row of [`Pit::snapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PitSnapshotEntry {
    pub name: String,
    pub faces: Vec<FaceId>,
    /// Milliseconds until expiry; negative once expired.
    pub valid_for_ms: i64,
}

pub struct Pit {
    max_size: usize,
    tree: NameTree<PitEntry>,
    recency: LruCache<Name, ()>,
}

impl Pit {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            tree: NameTree::new(),
            recency: LruCache::unbounded(),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Change the capacity. A smaller capacity takes effect on the next
    /// insert; existing entries are not evicted here.
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn find(&self, name: &Name) -> Option<&PitEntry> {
        self.tree.find(name)
    }

    /// Record that `face` wants `name`.
    ///
    /// Returns `None` without touching the table when `lifetime` is below
    /// [`MINIMAL_INTEREST_LIFETIME`].
    pub fn insert(&mut self, name: &Name, lifetime: Duration, face: &FaceRef) -> Option<PitInsert> {
        self.insert_at(name, lifetime, face, Instant::now())
    }

    pub fn insert_at(
        &mut self,
        name: &Name,
        lifetime: Duration,
        face: &FaceRef,
        now: Instant,
    ) -> Option<PitInsert> {
        if lifetime < MINIMAL_INTEREST_LIFETIME {
            debug!("{} rejected, lifetime {:?} is too short", name, lifetime);
            return None;
        }

        if let Some(entry) = self.tree.find_mut(name) {
            self.recency.promote(name);
            if !entry.is_valid_at(now) {
                *entry = PitEntry::new(face, lifetime, now);
                debug!("{} expired entry restarted by face {}", name, face.id());
                return Some(PitInsert::Forward);
            }

            let retransmit = entry.add_face(face, lifetime, now);
            debug!("{} aggregated face {}, retransmit: {}", name, face.id(), retransmit);
            return Some(if retransmit {
                PitInsert::Forward
            } else {
                PitInsert::Suppress
            });
        }

        self.tree.insert(name, PitEntry::new(face, lifetime, now));
        self.recency.put(name.clone(), ());
        if self.recency.len() > self.max_size {
            if let Some((oldest, ())) = self.recency.pop_lru() {
                self.tree.remove(&oldest);
                debug!("{} evicted", oldest);
            }
        }
        debug!("{} new entry for face {}", name, face.id());
        Some(PitInsert::Forward)
    }

    /// Collect the faces waiting for Data named `data_name`.
    ///
    /// Every entry at `data_name` or an ancestor of it is drained. Faces of
    /// expired entries and faces that no longer exist are discarded. The
    /// result holds each live face once, ordered by id.
    ///
    /// Expired entries never receive Data, even when they have not been
    /// purged yet.
    pub fn get(&mut self, data_name: &Name) -> Vec<FaceRef> {
        self.get_at(data_name, Instant::now())
    }

    pub fn get_at(&mut self, data_name: &Name, now: Instant) -> Vec<FaceRef> {
        let mut faces = BTreeMap::new();
        for (_, entry) in self.tree.find_all_until_mut(data_name) {
            let valid = entry.is_valid_at(now);
            for (id, face) in entry.take_faces() {
                if !valid {
                    continue;
                }
                if let Some(face) = face.upgrade() {
                    faces.insert(id, face);
                }
            }
        }
        faces.into_values().collect()
    }

    pub fn snapshot(&self) -> Vec<PitSnapshotEntry> {
        self.snapshot_at(Instant::now())
    }

    /// Entries in name order, for the control channel.
    pub fn snapshot_at(&self, now: Instant) -> Vec<PitSnapshotEntry> {
        let mut rows = Vec::with_capacity(self.tree.len());
        self.tree.for_each(|name, entry| {
            let valid_for_ms = match entry.keep_until.checked_duration_since(now) {
                Some(remaining) => remaining.as_millis() as i64,
                None => -(now.duration_since(entry.keep_until).as_millis() as i64),
            };
            rows.push(PitSnapshotEntry {
                name: name.to_uri(),
                faces: entry.face_ids(),
                valid_for_ms,
            });
        });
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        rows
    }
}

impl Default for Pit {
    fn default() -> Self {
        Self::new(DEFAULT_PIT_SIZE)
    }
}
