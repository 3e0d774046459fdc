//! Bucket-locked map between feature keys and dense ids.

use std::hash::BuildHasher;
use std::sync::atomic::{AtomicBool, Ordering};

use hashbrown::hash_map::DefaultHashBuilder;
use hashbrown::HashMap;
use parking_lot::Mutex;
use sensei_core::{JRenumbering, Renumber, Sequence, INVALID_J, J};
use tracing::info;

use crate::key::FeatureKey;

const DEFAULT_BUCKETS: usize = 64;

/// Thread-safe bidirectional map `key <-> J`.
///
/// The forward direction lives in `num_buckets` independently locked hash
/// maps; an insert locks only the bucket its key hashes to and takes the new
/// id from the index's own [`Sequence`]. Ids are handed out densely in
/// creation order.
///
/// The reverse direction is a flat table indexed by `J`. It is rebuilt by
/// [`FeatureIndex::sync_j_to_feature_map`] and goes stale as soon as a new
/// key is inserted; reverse lookups on a stale table are a fatal error.
///
/// # Example
///
/// ```
/// use sensei_feature_index::{FeatureMap, FeatureName};
///
/// let mut map = FeatureMap::new();
/// let a = map.feature_to_j(&FeatureName::new("a"));
/// let b = map.feature_to_j(&FeatureName::new("b"));
/// assert_eq!((a, b), (0, 1));
/// assert_eq!(map.feature_to_j(&FeatureName::new("a")), a);
///
/// map.sync_j_to_feature_map();
/// assert_eq!(map.j_to_feature(b).as_str(), "b");
/// ```
#[derive(Debug)]
pub struct FeatureIndex<K> {
    buckets: Vec<Mutex<HashMap<K, J>>>,
    hash_builder: DefaultHashBuilder,
    sequence: Sequence,
    synced: AtomicBool,
    j_to_feature: Vec<K>,
}

impl<K: FeatureKey> Default for FeatureIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: FeatureKey> FeatureIndex<K> {
    pub fn new() -> Self {
        Self::with_sequence(Sequence::new())
    }

    /// Creates an index drawing ids from `sequence`.
    ///
    /// # Panics
    ///
    /// Panics if `sequence` does not start at 0; ids must be dense.
    pub fn with_sequence(sequence: Sequence) -> Self {
        Self::with_buckets(DEFAULT_BUCKETS, sequence)
    }

    /// # Panics
    ///
    /// Panics if `num_buckets` is 0 or `sequence` does not start at 0.
    pub fn with_buckets(num_buckets: usize, sequence: Sequence) -> Self {
        assert!(num_buckets > 0, "num_buckets must be greater than 0");
        assert_eq!(
            sequence.value(),
            0,
            "feature index sequence must start at 0"
        );
        Self {
            buckets: (0..num_buckets).map(|_| Mutex::new(HashMap::new())).collect(),
            hash_builder: DefaultHashBuilder::default(),
            synced: AtomicBool::new(true),
            sequence,
            j_to_feature: Vec::new(),
        }
    }

    #[inline]
    fn bucket(&self, key: &K) -> &Mutex<HashMap<K, J>> {
        let hash = self.hash_builder.hash_one(key);
        &self.buckets[(hash % self.buckets.len() as u64) as usize]
    }

    /// Returns the id of `key`, assigning the next free id if it is new.
    ///
    /// Safe to call concurrently with itself and with the other lookups.
    ///
    /// # Panics
    ///
    /// Panics when the id space is exhausted.
    pub fn feature_to_j(&self, key: &K) -> J {
        let mut bucket = self.bucket(key).lock();
        if let Some(&j) = bucket.get(key) {
            return j;
        }
        let j = self.sequence.next_j();
        assert_ne!(j, INVALID_J, "too many features");
        bucket.insert(key.clone(), j);
        self.synced.store(false, Ordering::Release);
        j
    }

    /// Id of `key`, or `None` if it was never inserted.
    pub fn get(&self, key: &K) -> Option<J> {
        self.bucket(key).lock().get(key).copied()
    }

    /// Id of `key`, or [`INVALID_J`] if it was never inserted.
    pub fn feature_to_j_const(&self, key: &K) -> J {
        self.get(key).unwrap_or(INVALID_J)
    }

    pub fn has_feature(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Number of ids assigned since creation or the last renumbering.
    pub fn len(&self) -> usize {
        self.sequence.value() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True if the reverse table reflects every insert.
    pub fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    /// Key with id `j`.
    ///
    /// # Panics
    ///
    /// Panics if a key was inserted after the last
    /// [`FeatureIndex::sync_j_to_feature_map`].
    pub fn j_to_feature(&self, j: J) -> &K {
        assert!(
            self.is_synced(),
            "reverse lookup of j {j} on an index that was modified since the last sync"
        );
        self.j_to_feature_unchecked(j)
    }

    /// Key with id `j` without the staleness check.
    ///
    /// Valid for every id that existed at the last sync, even while new keys
    /// are being inserted.
    pub fn j_to_feature_unchecked(&self, j: J) -> &K {
        let index = j as usize;
        assert!(
            index < self.j_to_feature.len(),
            "j {j} not in the reverse table (size {}), probably a missing sync",
            self.j_to_feature.len()
        );
        &self.j_to_feature[index]
    }

    /// Every `(J, key)` pair in id order.
    pub fn all(&self) -> impl Iterator<Item = (J, &K)> + '_ {
        assert!(self.is_synced(), "iterating an index that is not synced");
        self.j_to_feature
            .iter()
            .enumerate()
            .map(|(j, key)| (j as J, key))
    }

    /// Rebuilds the reverse table from the forward map.
    pub fn sync_j_to_feature_map(&mut self) {
        if self.is_synced() && self.j_to_feature.len() == self.len() {
            return;
        }
        let next_j = self.len();
        let mut slots: Vec<Option<K>> = (0..next_j).map(|_| None).collect();
        let mut valid_j_count = 0;
        for bucket in self.buckets.iter_mut() {
            for (key, &j) in bucket.get_mut().iter() {
                let slot = &mut slots[j as usize];
                assert!(slot.is_none(), "j {j} assigned to two keys");
                *slot = Some(key.clone());
                valid_j_count += 1;
            }
        }
        assert_eq!(valid_j_count, next_j, "forward map and id sequence disagree");
        self.j_to_feature = slots
            .into_iter()
            .enumerate()
            .map(|(j, key)| key.unwrap_or_else(|| panic!("no key has j {j}")))
            .collect();
        self.synced.store(true, Ordering::Release);
    }

    /// Approximate memory held by the index.
    pub fn size_in_bytes(&self) -> usize {
        let entry = std::mem::size_of::<K>() + std::mem::size_of::<J>();
        let heap: usize = self
            .buckets
            .iter()
            .map(|b| b.lock().keys().map(FeatureKey::heap_size_bytes).sum::<usize>())
            .sum();
        // Forward entries plus reverse table.
        self.len() * entry + self.j_to_feature.len() * std::mem::size_of::<K>() + heap
    }

    pub fn log_stats(&self, name: &str) {
        info!(
            index = name,
            size = self.len(),
            mib = self.size_in_bytes() as f64 / 1024.0 / 1024.0,
            "feature index stats"
        );
    }
}

impl<K: FeatureKey> Renumber for FeatureIndex<K> {
    /// Drops removed keys, relabels survivors and resyncs.
    ///
    /// Must not run concurrently with [`FeatureIndex::feature_to_j`]; the
    /// `&mut self` receiver enforces that.
    fn remove_and_renumber_js(&mut self, renumbering: &JRenumbering) {
        if renumbering.is_empty() {
            return;
        }
        assert_eq!(
            renumbering.j_to_new_j().len(),
            self.len(),
            "renumbering size does not match the index"
        );
        let next_j = renumbering.next_j();
        assert_ne!(next_j, INVALID_J, "too many features");
        self.sequence.set_next(u64::from(next_j));
        let mut valid_j_count = 0;
        for bucket in self.buckets.iter_mut() {
            bucket.get_mut().retain(|_, j| match renumbering.new_j(*j) {
                Some(new_j) => {
                    *j = new_j;
                    valid_j_count += 1;
                    true
                }
                None => false,
            });
        }
        assert_eq!(valid_j_count, next_j as usize);
        self.synced.store(false, Ordering::Release);
        self.sync_j_to_feature_map();
    }
}
