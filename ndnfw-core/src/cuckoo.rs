//! Cuckoo filter over precomputed 64-bit hashes.
//!
//! Partial-key cuckoo hashing: an item lives in one of two buckets, the
//! second derived from the first and the fingerprint alone, so entries can
//! be relocated without the original key. Lookups never miss an inserted
//! hash; false positives occur at a rate bounded by the fingerprint width.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rand::Rng;

/// Slots per bucket.
pub const SLOTS_PER_BUCKET: usize = 4;

/// Relocation steps attempted before an insert gives up.
pub const MAX_KICKS: usize = 500;

/// Fingerprint stored in each slot; zero marks an empty slot.
pub type Fingerprint = u32;

#[derive(Clone, Debug, Default)]
struct Bucket {
    slots: [Fingerprint; SLOTS_PER_BUCKET],
}

impl Bucket {
    fn insert(&mut self, fp: Fingerprint) -> bool {
        for slot in &mut self.slots {
            if *slot == 0 {
                *slot = fp;
                return true;
            }
        }
        false
    }

    fn contains(&self, fp: Fingerprint) -> bool {
        self.slots.iter().any(|&slot| slot == fp)
    }

    fn delete(&mut self, fp: Fingerprint) -> bool {
        for slot in &mut self.slots {
            if *slot == fp {
                *slot = 0;
                return true;
            }
        }
        false
    }
}

/// A slot overwritten while relocating, kept so a failed insert can undo it.
struct Displaced {
    bucket: usize,
    slot: usize,
    previous: Fingerprint,
}

#[derive(Clone, Debug)]
pub struct CuckooFilter {
    buckets: Vec<Bucket>,
    mask: usize,
    count: usize,
}

impl CuckooFilter {
    /// Create a filter sized for roughly `capacity` items.
    pub fn new(capacity: usize) -> Self {
        let bucket_count = capacity
            .div_ceil(SLOTS_PER_BUCKET)
            .next_power_of_two()
            .max(4);

        Self {
            buckets: vec![Bucket::default(); bucket_count],
            mask: bucket_count - 1,
            count: 0,
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Insert a hash.
    ///
    /// Returns `false` when no free slot could be found; the filter is then
    /// exactly as it was before the call.
    pub fn insert(&mut self, hash: u64) -> bool {
        let (fp, i1, i2) = self.indices(hash);

        if self.buckets[i1].insert(fp) || self.buckets[i2].insert(fp) {
            self.count += 1;
            return true;
        }

        let start = if rand::thread_rng().gen_bool(0.5) { i1 } else { i2 };
        self.relocate(fp, start)
    }

    fn relocate(&mut self, mut fp: Fingerprint, mut index: usize) -> bool {
        let mut rng = rand::thread_rng();
        let mut displaced = Vec::new();

        for _ in 0..MAX_KICKS {
            let slot = rng.gen_range(0..SLOTS_PER_BUCKET);
            let victim = std::mem::replace(&mut self.buckets[index].slots[slot], fp);
            displaced.push(Displaced {
                bucket: index,
                slot,
                previous: victim,
            });

            fp = victim;
            index = self.alt_index(index, fp);
            if self.buckets[index].insert(fp) {
                self.count += 1;
                return true;
            }
        }

        for entry in displaced.into_iter().rev() {
            self.buckets[entry.bucket].slots[entry.slot] = entry.previous;
        }
        false
    }

    /// Check if the hash might be in the filter.
    pub fn contains(&self, hash: u64) -> bool {
        let (fp, i1, i2) = self.indices(hash);
        self.buckets[i1].contains(fp) || self.buckets[i2].contains(fp)
    }

    /// Delete one occurrence of the hash.
    ///
    /// Only hashes that were inserted should be deleted, otherwise a
    /// colliding entry may be removed instead.
    pub fn delete(&mut self, hash: u64) -> bool {
        let (fp, i1, i2) = self.indices(hash);
        if self.buckets[i1].delete(fp) || self.buckets[i2].delete(fp) {
            self.count = self.count.saturating_sub(1);
            return true;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn load_factor(&self) -> f64 {
        self.count as f64 / (self.buckets.len() * SLOTS_PER_BUCKET) as f64
    }

    fn indices(&self, hash: u64) -> (Fingerprint, usize, usize) {
        let fp = match (hash >> 32) as Fingerprint {
            0 => 1,
            fp => fp,
        };
        let i1 = hash as usize & self.mask;
        let i2 = self.alt_index(i1, fp);
        (fp, i1, i2)
    }

    fn alt_index(&self, index: usize, fp: Fingerprint) -> usize {
        let mut hasher = DefaultHasher::new();
        fp.hash(&mut hasher);
        (index ^ hasher.finish() as usize) & self.mask
    }
}
