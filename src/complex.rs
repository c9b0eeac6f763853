//! # Complex Keys
//!
//! Tables are keyed by `u64`. [`ComplexKeyAdapter`] lets callers cache under
//! arbitrary keys (strings, tuples, structs) by projecting them onto the
//! 64-bit key space and storing the original key in the record's metadata.
//!
//! ## Key Chain
//!
//! ```text
//!   "order/17"  ──project──►  id
//!
//!   offset  id     id+1    id+2    id+3    id+4
//!           ┌──────┬───────┬───────┬───────┬───────┐
//!           │ "a"  │  ∅    │       │       │       │   put("order/17") lands in id+1
//!           └──────┴───────┴───────┴───────┴───────┘
//!              ▲ metadata != key, try the next id
//! ```
//!
//! - Every operation walks at most [`MAX_CHAIN_LENGTH`] consecutive keys,
//!   wrapping at `u64::MAX`.
//! - A record on the chain belongs to the key when its metadata downcasts to
//!   `K` and compares equal.
//! - The first empty or matching position is used. When all positions hold
//!   other keys a put is dropped and a get misses: the table is a cache, not a
//!   map.
//!
//! The chain is only as reliable as the projector: projections from a good
//! hash rarely share a neighbourhood, so chains stay short.

use std::hash::{Hash, Hasher};
use std::sync::Arc;

use rustc_hash::FxHasher;

use crate::table::{PutPolicy, PutResult, Record, Table};
use crate::traits::CacheValue;

/// Consecutive 64-bit keys visited per complex-key operation.
pub const MAX_CHAIN_LENGTH: u64 = 5;

/// Maps a complex key onto the table's 64-bit key space.
pub trait KeyProjector<K: ?Sized> {
    fn project(&self, key: &K) -> u64;
}

/// Projects any `Hash` key with FxHash. Stable within a process.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashProjector;

impl<K: Hash + ?Sized> KeyProjector<K> for HashProjector {
    fn project(&self, key: &K) -> u64 {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        hasher.finish()
    }
}

/// Projects byte-like keys (typically strings) by weighting their trailing
/// bytes into the low half and mixing a hash of the whole key into the high
/// half.
///
/// Suited to keys that share a long prefix and differ at the end, such as
/// `"customer/000123"`: neighbouring ids land in distinct buckets.
#[derive(Debug, Clone, Copy)]
pub struct SuffixProjector {
    suffix_len: usize,
}

impl SuffixProjector {
    /// Weighs at most `suffix_len` trailing bytes (clamped to `1..=8`).
    pub fn new(suffix_len: usize) -> Self {
        Self {
            suffix_len: suffix_len.clamp(1, 8),
        }
    }
}

impl Default for SuffixProjector {
    fn default() -> Self {
        Self::new(4)
    }
}

impl<K: AsRef<[u8]> + ?Sized> KeyProjector<K> for SuffixProjector {
    fn project(&self, key: &K) -> u64 {
        let bytes = key.as_ref();
        let tail = &bytes[bytes.len().saturating_sub(self.suffix_len)..];
        let suffix = tail
            .iter()
            .rev()
            .enumerate()
            .fold(0u32, |acc, (i, &b)| {
                acc.wrapping_add(u32::from(b).wrapping_mul(31u32.wrapping_pow(i as u32)))
            });

        let mut hasher = FxHasher::default();
        hasher.write(bytes);
        let mixed = (hasher.finish() >> 32) as u32;
        (u64::from(mixed) << 32) | u64::from(suffix ^ mixed.rotate_left(16))
    }
}

/// Stores values under complex keys in a [`Table`].
#[derive(Debug, Clone, Default)]
pub struct ComplexKeyAdapter<P = HashProjector> {
    projector: P,
}

impl ComplexKeyAdapter<HashProjector> {
    /// Adapter projecting keys with [`HashProjector`].
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{ComplexKeyAdapter, Table, TableOptions};
    ///
    /// let table: Table<u32> = Table::new("carts", &TableOptions::default());
    /// let adapter = ComplexKeyAdapter::new();
    ///
    /// adapter.put(&table, &("eu", 7u32), 3);
    /// assert_eq!(*adapter.get(&table, &("eu", 7u32)).unwrap().value(), 3);
    /// ```
    pub fn new() -> Self {
        Self::default()
    }
}

impl<P> ComplexKeyAdapter<P> {
    /// Adapter using a caller-supplied projector.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{ComplexKeyAdapter, SuffixProjector, Table, TableOptions};
    ///
    /// let table: Table<String> = Table::new("customers", &TableOptions::default());
    /// let adapter = ComplexKeyAdapter::with_projector(SuffixProjector::new(6));
    ///
    /// adapter.put(&table, &"customer/000123", "ada".to_string());
    /// assert!(adapter.get(&table, &"customer/000124").is_none());
    /// ```
    pub fn with_projector(projector: P) -> Self {
        Self { projector }
    }

    pub fn projector(&self) -> &P {
        &self.projector
    }

    /// Starting 64-bit key of `key`'s chain.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::ComplexKeyAdapter;
    ///
    /// let adapter = ComplexKeyAdapter::new();
    /// assert_eq!(adapter.project("a"), adapter.project("a"));
    /// ```
    pub fn project<K: ?Sized>(&self, key: &K) -> u64
    where
        P: KeyProjector<K>,
    {
        self.projector.project(key)
    }

    /// Stores `value` under `key` with the default policy.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{ComplexKeyAdapter, Table, TableOptions};
    ///
    /// let table: Table<u64> = Table::new("orders", &TableOptions::default());
    /// let adapter = ComplexKeyAdapter::new();
    /// let key = "order/17".to_string();
    ///
    /// assert!(adapter.put(&table, &key, 1).unwrap().inserted());
    /// assert!(!adapter.put(&table, &key, 2).unwrap().inserted());
    /// assert_eq!(table.count(), 1);
    /// ```
    pub fn put<K, V>(&self, table: &Table<V>, key: &K, value: V) -> Option<PutResult<V>>
    where
        P: KeyProjector<K>,
        K: Clone + PartialEq + Send + Sync + 'static,
        V: CacheValue,
    {
        self.put_with(table, key, value, &PutPolicy::default())
    }

    /// Stores `value` under `key`. The policy's metadata is replaced by the key.
    ///
    /// Each position is claimed under its stripe lock, so two callers racing
    /// on colliding keys end up on different positions. Returns `None` when
    /// every position of the chain holds another key.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{ComplexKeyAdapter, PutPolicy, Table, TableOptions};
    ///
    /// let table: Table<u64> = Table::new("orders", &TableOptions::default());
    /// let adapter = ComplexKeyAdapter::new();
    /// let policy = PutPolicy::default().with_max_age(30).with_priority(1);
    ///
    /// let result = adapter.put_with(&table, &("order", 17u32), 5, &policy).unwrap();
    /// assert_eq!(result.record.priority(), 1);
    /// assert!(result.record.metadata_eq(&("order", 17u32)));
    /// ```
    pub fn put_with<K, V>(
        &self,
        table: &Table<V>,
        key: &K,
        value: V,
        policy: &PutPolicy,
    ) -> Option<PutResult<V>>
    where
        P: KeyProjector<K>,
        K: Clone + PartialEq + Send + Sync + 'static,
        V: CacheValue,
    {
        let start = self.projector.project(key);
        let policy = policy.clone().with_metadata(Arc::new(key.clone()));
        let mut value = value;
        for offset in 0..MAX_CHAIN_LENGTH {
            let id = start.wrapping_add(offset);
            match table.put_unless_taken(id, value, &policy, |record| !record.metadata_eq(key)) {
                Ok(result) => return Some(result),
                Err(refused) => value = refused,
            }
        }
        None
    }

    /// Looks up `key`. Counts a complex hit or miss on the table.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{ComplexKeyAdapter, Table, TableOptions};
    ///
    /// let table: Table<u64> = Table::new("orders", &TableOptions::default());
    /// let adapter = ComplexKeyAdapter::new();
    /// adapter.put(&table, &"a", 1);
    ///
    /// assert_eq!(*adapter.get(&table, &"a").unwrap().value(), 1);
    /// assert!(adapter.get(&table, &"b").is_none());
    /// ```
    pub fn get<K, V>(&self, table: &Table<V>, key: &K) -> Option<Arc<Record<V>>>
    where
        P: KeyProjector<K>,
        K: PartialEq + 'static,
    {
        match self.find(table, key) {
            Some(record) => {
                record.record_hit();
                table.counters().inc_complex_hit();
                Some(record)
            },
            None => {
                table.counters().inc_complex_miss();
                None
            },
        }
    }

    /// Removes `key`, disposing its value. Returns false when absent.
    ///
    /// # Example
    ///
    /// ```
    /// use tablecache::{ComplexKeyAdapter, Table, TableOptions};
    ///
    /// let table: Table<u64> = Table::new("orders", &TableOptions::default());
    /// let adapter = ComplexKeyAdapter::new();
    /// adapter.put(&table, &"a", 1);
    ///
    /// assert!(adapter.remove(&table, &"a"));
    /// assert!(!adapter.remove(&table, &"a"));
    /// ```
    pub fn remove<K, V>(&self, table: &Table<V>, key: &K) -> bool
    where
        P: KeyProjector<K>,
        K: PartialEq + 'static,
        V: CacheValue,
    {
        match self.find(table, key) {
            Some(record) => table.remove_where(record.key(), |current| current.metadata_eq(key)),
            None => false,
        }
    }

    fn find<K, V>(&self, table: &Table<V>, key: &K) -> Option<Arc<Record<V>>>
    where
        P: KeyProjector<K>,
        K: PartialEq + 'static,
    {
        let start = self.projector.project(key);
        for offset in 0..MAX_CHAIN_LENGTH {
            let record = table.lookup(start.wrapping_add(offset), 0)?;
            if record.metadata_eq(key) {
                return Some(record);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::TableOptions;

    struct Fixed(u64);

    impl KeyProjector<String> for Fixed {
        fn project(&self, _key: &String) -> u64 {
            self.0
        }
    }

    fn table() -> Table<u32> {
        Table::new(
            "complex",
            &TableOptions {
                bucket_count: 101,
                rec_per_page: 3,
                lock_count: 4,
                ..TableOptions::default()
            },
        )
    }

    #[test]
    fn round_trip_with_hash_projector() {
        let table = table();
        let adapter = ComplexKeyAdapter::new();
        let key = ("orders".to_string(), 17u32);

        assert!(adapter.put(&table, &key, 5).unwrap().inserted());
        let record = adapter.get(&table, &key).unwrap();
        assert_eq!(*record.value(), 5);
        assert!(record.metadata_eq(&key));
        assert!(adapter.get(&table, &("orders".to_string(), 18u32)).is_none());
    }

    #[test]
    fn same_key_replaces_in_place() {
        let table = table();
        let adapter = ComplexKeyAdapter::new();
        let key = "k".to_string();
        adapter.put(&table, &key, 1);
        let second = adapter.put(&table, &key, 2).unwrap();
        assert!(!second.inserted());
        assert_eq!(*adapter.get(&table, &key).unwrap().value(), 2);
        assert_eq!(table.count(), 1);
    }

    #[test]
    fn chain_holds_five_colliding_keys_then_drops() {
        let table = table();
        let adapter = ComplexKeyAdapter::with_projector(Fixed(10));

        for i in 0..MAX_CHAIN_LENGTH {
            let result = adapter.put(&table, &format!("key-{i}"), i as u32);
            assert!(result.is_some_and(|r| r.inserted()), "key-{i} should fit");
        }
        assert!(adapter.put(&table, &"key-5".to_string(), 5).is_none());
        assert_eq!(table.count(), 5);

        for i in 0..MAX_CHAIN_LENGTH {
            let record = adapter.get(&table, &format!("key-{i}")).unwrap();
            assert_eq!(record.key(), 10 + i);
        }
        assert!(adapter.get(&table, &"key-5".to_string()).is_none());

        #[cfg(feature = "metrics")]
        {
            let counters = table.metrics().counters;
            assert_eq!(counters.complex_hits, 5);
            assert_eq!(counters.complex_misses, 1);
        }
    }

    #[test]
    fn remove_frees_chain_position() {
        let table = table();
        let adapter = ComplexKeyAdapter::with_projector(Fixed(40));
        for i in 0..MAX_CHAIN_LENGTH {
            adapter.put(&table, &format!("key-{i}"), i as u32);
        }

        assert!(adapter.remove(&table, &"key-4".to_string()));
        assert!(!adapter.remove(&table, &"key-4".to_string()));
        assert!(adapter.put(&table, &"late".to_string(), 9).is_some());
        assert_eq!(adapter.get(&table, &"late".to_string()).unwrap().key(), 44);
    }

    #[test]
    fn plain_puts_are_not_complex_matches() {
        let table = table();
        let adapter = ComplexKeyAdapter::with_projector(Fixed(20));
        table.put(20, 1);
        assert!(adapter.get(&table, &"x".to_string()).is_none());
        let result = adapter.put(&table, &"x".to_string(), 2).unwrap();
        assert_eq!(result.record.key(), 21);
    }

    #[test]
    fn suffix_projector_separates_sequential_ids() {
        let projector = SuffixProjector::default();
        let a = projector.project("customer/000123");
        let b = projector.project("customer/000124");
        assert_ne!(a, b);
        assert_eq!(a, projector.project("customer/000123"));
        assert_eq!(
            KeyProjector::<str>::project(&projector, "x"),
            KeyProjector::<String>::project(&projector, &"x".to_string())
        );
    }

    #[test]
    fn suffix_projector_handles_short_and_empty_keys() {
        let projector = SuffixProjector::new(8);
        let _ = projector.project("");
        assert_ne!(projector.project("a"), projector.project("b"));
    }
}
