//! The raw Robin Hood table.
//!
//! [`HashTable`] knows nothing about how keys are hashed or compared: every
//! operation takes a precomputed `u64` hash and an equality predicate. The
//! keyed [`HashMap`](crate::HashMap) wrapper binds those once at
//! construction.

use alloc::vec::Vec;
use core::alloc::Layout;
use core::fmt::Debug;
use core::marker::PhantomData;
use core::mem;

use crate::error::TryReserveError;
use crate::handle::Handle;
use crate::handle::TableId;

/// The table grows once more than 77% of its slots are occupied.
const MAX_LOAD_NUMERATOR: u128 = 77;
const MAX_LOAD_DENOMINATOR: u128 = 100;

/// Slots allocated per expected element.
const SIZING_NUMERATOR: u128 = 13;
const SIZING_DENOMINATOR: u128 = 10;

#[inline(always)]
fn exceeds_max_load(len: usize, capacity: usize) -> bool {
    capacity == 0 || len as u128 * MAX_LOAD_DENOMINATOR > capacity as u128 * MAX_LOAD_NUMERATOR
}

/// Returns the slot count allocated for `expected` elements:
/// `(⌊expected × 1.3⌋ | 1) + 2`.
///
/// The result is always odd, which spreads poorly distributed hashes better
/// than a power of two would under `hash % capacity`.
///
/// # Examples
///
/// ```rust
/// use robin_map::hash_table::capacity_for;
///
/// assert_eq!(capacity_for(0), 3);
/// assert_eq!(capacity_for(15), 21);
/// assert_eq!(capacity_for(100), 133);
/// ```
pub fn capacity_for(expected: usize) -> usize {
    let scaled = (expected as u128 * SIZING_NUMERATOR / SIZING_DENOMINATOR).min(usize::MAX as u128);
    (scaled as usize | 1).saturating_add(2)
}

#[inline(always)]
fn grown_capacity(capacity: usize) -> usize {
    capacity.saturating_mul(2) | 1
}

#[derive(Clone)]
struct Bucket<K, V> {
    hash: u64,
    distance: usize,
    key: K,
    value: V,
}

#[derive(Clone)]
enum Slot<K, V> {
    Empty,
    Occupied(Bucket<K, V>),
}

impl<K, V> Slot<K, V> {
    #[inline(always)]
    fn as_bucket(&self) -> Option<&Bucket<K, V>> {
        match self {
            Slot::Occupied(bucket) => Some(bucket),
            Slot::Empty => None,
        }
    }

    #[inline(always)]
    fn as_bucket_mut(&mut self) -> Option<&mut Bucket<K, V>> {
        match self {
            Slot::Occupied(bucket) => Some(bucket),
            Slot::Empty => None,
        }
    }

    #[inline(always)]
    fn into_bucket(self) -> Option<Bucket<K, V>> {
        match self {
            Slot::Occupied(bucket) => Some(bucket),
            Slot::Empty => None,
        }
    }

    #[inline(always)]
    fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }
}

/// Outcome of one pass of [`HashTable::probe_insert`].
enum Probe<K, V> {
    /// The caller's entry sits at `index`; `previous` is the value it
    /// replaced, if its key was already present.
    Placed { index: usize, previous: Option<V> },
    /// The walk reached an occupied slot holding another key while the table
    /// was over its load limit. Nothing was moved.
    Crowded(Bucket<K, V>),
}

fn empty_slots<K, V>(capacity: usize) -> Vec<Slot<K, V>> {
    let mut slots = Vec::with_capacity(capacity);
    slots.resize_with(capacity, || Slot::Empty);
    slots
}

fn try_empty_slots<K, V>(capacity: usize) -> Result<Vec<Slot<K, V>>, TryReserveError> {
    if Layout::array::<Slot<K, V>>(capacity).is_err() {
        return Err(TryReserveError::CapacityOverflow);
    }

    let mut slots = Vec::new();
    slots
        .try_reserve_exact(capacity)
        .map_err(|_| TryReserveError::AllocError { capacity })?;
    slots.resize_with(capacity, || Slot::Empty);
    Ok(slots)
}

/// A hash table using Robin Hood open addressing with backward-shift
/// deletion.
///
/// `HashTable<K, V>` stores key/value pairs in a single flat array of slots.
/// Like hashbrown's raw table, it requires the caller to provide the hash for
/// every operation together with an equality predicate, so any notion of key
/// identity can be injected.
///
/// On a collision the entry that is further from its home bucket keeps the
/// slot and the "richer" one moves on, which keeps probe lengths short and
/// uniform. Removal shifts the rest of the cluster back by one slot instead
/// of leaving a tombstone.
///
/// Lookups return [`Handle`]s: cheap references to a slot that are valid
/// until the next mutation of the table.
///
/// ## Performance Characteristics
///
/// - **Memory**: one `u64` hash and one `usize` displacement per slot, plus
///   the size of `(K, V)`. The table keeps at most 77% of its slots full.
///
/// ## Example
///
/// ```rust
/// # use core::hash::Hash;
/// # use core::hash::Hasher;
/// #
/// # use robin_map::hash_table::HashTable;
/// # use siphasher::sip::SipHasher;
/// #
/// # fn hash_str(s: &str) -> u64 {
/// #     let mut hasher = SipHasher::new();
/// #     s.hash(&mut hasher);
/// #     hasher.finish()
/// # }
/// #
/// let mut table: HashTable<String, u32> = HashTable::with_capacity(16);
///
/// table.insert(hash_str("alice"), "alice".to_string(), 31, |a, b| a == b);
/// table.insert(hash_str("bob"), "bob".to_string(), 27, |a, b| a == b);
///
/// let handle = table.find(hash_str("alice"), |k| k == "alice");
/// assert_eq!(table.value(handle), Some(&31));
///
/// table.remove_handle(handle);
/// assert_eq!(table.len(), 1);
/// assert!(!table.find(hash_str("alice"), |k| k == "alice").is_valid());
/// ```
pub struct HashTable<K, V> {
    slots: Vec<Slot<K, V>>,
    populated: usize,

    id: TableId,
    generation: u64,
}

impl<K, V> Debug for HashTable<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::format;
        use alloc::string::String;
        use alloc::string::ToString;

        if self.is_empty() {
            return f
                .debug_struct("HashTable")
                .field("slots", &"empty")
                .field("populated", &self.populated)
                .field("capacity", &self.capacity())
                .finish();
        }

        f.debug_struct("HashTable")
            .field(
                "distances",
                &self
                    .slots
                    .chunks(16)
                    .map(|row| {
                        row.iter()
                            .map(|slot| match slot.as_bucket() {
                                Some(bucket) => format!("{:02}", bucket.distance),
                                None => "..".to_string(),
                            })
                            .collect::<Vec<String>>()
                            .join(", ")
                    })
                    .collect::<Vec<_>>(),
            )
            .field("populated", &self.populated)
            .field("capacity", &self.capacity())
            .field("generation", &self.generation)
            .finish()
    }
}

impl<K, V> Clone for HashTable<K, V>
where
    K: Clone,
    V: Clone,
{
    fn clone(&self) -> Self {
        Self {
            slots: self.slots.clone(),
            populated: self.populated,
            id: TableId::next(),
            generation: 0,
        }
    }
}

impl<K, V> Default for HashTable<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> HashTable<K, V> {
    /// Creates an empty table sized for zero elements (three slots).
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates a table sized for `expected` elements.
    ///
    /// The slot count is [`capacity_for(expected)`](capacity_for), so the
    /// table can hold a little more than `expected` entries before it grows.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_map::hash_table::HashTable;
    /// #
    /// let table: HashTable<u64, String> = HashTable::with_capacity(15);
    /// assert_eq!(table.capacity(), 21);
    /// ```
    pub fn with_capacity(expected: usize) -> Self {
        Self {
            slots: empty_slots(capacity_for(expected)),
            populated: 0,
            id: TableId::next(),
            generation: 0,
        }
    }

    /// Returns the number of slots in the table.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns the number of elements in the table.
    pub fn len(&self) -> usize {
        self.populated
    }

    /// Returns `true` if the table contains no elements.
    pub fn is_empty(&self) -> bool {
        self.populated == 0
    }

    #[inline(always)]
    fn home(&self, hash: u64) -> usize {
        (hash % self.slots.len() as u64) as usize
    }

    /// Invalidates every outstanding handle.
    #[inline(always)]
    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    #[inline(always)]
    fn handle_at(&self, index: usize) -> Handle {
        Handle::new(self.id, self.generation, index)
    }

    #[inline]
    fn index_of(&self, handle: Handle) -> Option<usize> {
        handle
            .slot_for(self.id, self.generation)
            .filter(|&index| self.slots.get(index).is_some_and(|slot| !slot.is_empty()))
    }

    fn find_index(&self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<usize> {
        if self.populated == 0 {
            return None;
        }

        let capacity = self.slots.len();
        let mut index = self.home(hash);
        for probe in 0..capacity {
            let bucket = self.slots[index].as_bucket()?;
            // Robin Hood ordering: anything past a richer slot started its
            // probe after our home bucket, so the key cannot be further on.
            if bucket.distance < probe {
                return None;
            }
            if bucket.hash == hash && eq(&bucket.key) {
                return Some(index);
            }
            index = if index + 1 == capacity { 0 } else { index + 1 };
        }

        None
    }

    /// Finds the entry with the given hash for which `eq` returns `true`.
    ///
    /// Returns [`Handle::INVALID`] if there is no such entry. The handle is
    /// only usable until the next mutation of the table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_map::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// table.insert(7, 7u64, "seven", |a, b| a == b);
    ///
    /// let found = table.find(7, |&k| k == 7);
    /// assert_eq!(table.resolve(found), Some((&7, &"seven")));
    ///
    /// assert!(!table.find(8, |&k| k == 8).is_valid());
    /// ```
    pub fn find(&self, hash: u64, eq: impl Fn(&K) -> bool) -> Handle {
        match self.find_index(hash, eq) {
            Some(index) => self.handle_at(index),
            None => Handle::INVALID,
        }
    }

    /// Returns references to the key and value matching `hash` and `eq`.
    pub fn get(&self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<(&K, &V)> {
        let index = self.find_index(hash, eq)?;
        self.slots[index]
            .as_bucket()
            .map(|bucket| (&bucket.key, &bucket.value))
    }

    /// Returns the key and a mutable reference to the value matching `hash`
    /// and `eq`.
    pub fn get_mut(&mut self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<(&K, &mut V)> {
        let index = self.find_index(hash, eq)?;
        self.slots[index]
            .as_bucket_mut()
            .map(|bucket| (&bucket.key, &mut bucket.value))
    }

    /// Returns the key and value a handle refers to, or `None` if the handle
    /// is invalid, stale, or belongs to another table.
    pub fn resolve(&self, handle: Handle) -> Option<(&K, &V)> {
        let index = self.index_of(handle)?;
        self.slots[index]
            .as_bucket()
            .map(|bucket| (&bucket.key, &bucket.value))
    }

    /// Mutable counterpart of [`resolve`](Self::resolve).
    pub fn resolve_mut(&mut self, handle: Handle) -> Option<(&K, &mut V)> {
        let index = self.index_of(handle)?;
        self.slots[index]
            .as_bucket_mut()
            .map(|bucket| (&bucket.key, &mut bucket.value))
    }

    /// Returns the key a handle refers to.
    pub fn key(&self, handle: Handle) -> Option<&K> {
        self.resolve(handle).map(|(key, _)| key)
    }

    /// Returns the value a handle refers to.
    pub fn value(&self, handle: Handle) -> Option<&V> {
        self.resolve(handle).map(|(_, value)| value)
    }

    /// Returns a mutable reference to the value a handle refers to.
    ///
    /// Writing through a handle does not move any entry, so it does not
    /// invalidate outstanding handles.
    pub fn value_mut(&mut self, handle: Handle) -> Option<&mut V> {
        self.resolve_mut(handle).map(|(_, value)| value)
    }

    /// Returns `true` if the handle still refers to an entry of this table.
    pub fn contains_handle(&self, handle: Handle) -> bool {
        self.index_of(handle).is_some()
    }

    /// Returns how many slots past its home bucket the referenced entry sits.
    pub fn displacement(&self, handle: Handle) -> Option<usize> {
        let index = self.index_of(handle)?;
        self.slots[index].as_bucket().map(|bucket| bucket.distance)
    }

    /// Returns a handle to an arbitrary entry, or [`Handle::INVALID`] if the
    /// table is empty.
    ///
    /// No ordering is implied; this is a seed for draining loops:
    ///
    /// ```rust
    /// # use robin_map::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// for k in 0..5u64 {
    ///     table.insert(k, k, k * 10, |a, b| a == b);
    /// }
    ///
    /// let mut total = 0;
    /// loop {
    ///     let handle = table.first();
    ///     let Some((_, value)) = table.remove_handle(handle) else {
    ///         break;
    ///     };
    ///     total += value;
    /// }
    /// assert_eq!(total, 100);
    /// assert!(table.is_empty());
    /// ```
    pub fn first(&self) -> Handle {
        if self.populated == 0 {
            return Handle::INVALID;
        }

        self.slots
            .iter()
            .position(|slot| !slot.is_empty())
            .map_or(Handle::INVALID, |index| self.handle_at(index))
    }

    /// Inserts `key` and `value`, or overwrites the value of an equal key.
    ///
    /// `eq` compares a stored key against the incoming one; it is only
    /// consulted for stored entries whose hash equals `hash`. Returns the
    /// previous value if the key was already present. Any outstanding
    /// handles are invalidated.
    ///
    /// If the walk from the key's home slot passes an occupied slot holding
    /// another key while more than 77% of slots are in use, the table grows
    /// to `2 × capacity + 1` slots and the insertion starts over. Filling an
    /// empty home slot or overwriting an equal key never grows the table.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_map::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// assert_eq!(table.insert(3, 3u64, "a", |a, b| a == b), None);
    /// assert_eq!(table.insert(3, 3u64, "b", |a, b| a == b), Some("a"));
    /// assert_eq!(table.len(), 1);
    /// ```
    pub fn insert(&mut self, hash: u64, key: K, value: V, eq: impl Fn(&K, &K) -> bool) -> Option<V> {
        self.touch();
        let pending = Bucket {
            hash,
            distance: 0,
            key,
            value,
        };
        self.insert_growing(pending, eq).1
    }

    /// Places `pending`, growing the table and starting over whenever the
    /// probe reports it crowded.
    ///
    /// Returns the slot the caller's key ended up in and the replaced value,
    /// if any.
    fn insert_growing(
        &mut self,
        mut pending: Bucket<K, V>,
        eq: impl Fn(&K, &K) -> bool,
    ) -> (usize, Option<V>) {
        loop {
            if self.slots.is_empty() {
                self.grow();
                continue;
            }

            match self.probe_insert(pending, &eq, true) {
                Probe::Placed { index, previous } => return (index, previous),
                Probe::Crowded(bucket) => {
                    pending = bucket;
                    pending.distance = 0;
                    self.grow();
                }
            }
        }
    }

    /// Walks forward from the home bucket of `pending`, displacing richer
    /// entries, until the entry lands in an empty slot or matches an equal
    /// key.
    ///
    /// With `check_load` set, the walk gives `pending` back untouched if it
    /// passes an occupied slot holding another key while the table is over
    /// its load limit. Without it, the table must have an empty slot.
    fn probe_insert(
        &mut self,
        mut pending: Bucket<K, V>,
        eq: impl Fn(&K, &K) -> bool,
        check_load: bool,
    ) -> Probe<K, V> {
        debug_assert!(check_load || self.populated < self.slots.len());

        let capacity = self.slots.len();
        let mut index = self.home(pending.hash);
        let mut landed = None;
        loop {
            if let Some(bucket) = self.slots[index].as_bucket_mut() {
                // Once the caller's entry is placed, `pending` is an evicted
                // entry whose key is already unique in the table.
                if landed.is_none() && bucket.hash == pending.hash && eq(&bucket.key, &pending.key) {
                    let previous = mem::replace(&mut bucket.value, pending.value);
                    return Probe::Placed {
                        index,
                        previous: Some(previous),
                    };
                }

                // The population is fixed during a walk, so the first slot
                // that reaches this check decides, before anything has moved.
                if check_load && landed.is_none() && exceeds_max_load(self.populated, capacity) {
                    return Probe::Crowded(pending);
                }

                if bucket.distance < pending.distance {
                    mem::swap(bucket, &mut pending);
                    landed.get_or_insert(index);
                }

                pending.distance += 1;
                index = if index + 1 == capacity { 0 } else { index + 1 };
                continue;
            }

            self.slots[index] = Slot::Occupied(pending);
            self.populated += 1;
            return Probe::Placed {
                index: landed.unwrap_or(index),
                previous: None,
            };
        }
    }

    /// Removes the entry matching `hash` and `eq`, returning it.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_map::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// table.insert(42, 42u64, "answer", |a, b| a == b);
    ///
    /// assert_eq!(table.remove(42, |&k| k == 42), Some((42, "answer")));
    /// assert_eq!(table.remove(42, |&k| k == 42), None);
    /// ```
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&K) -> bool) -> Option<(K, V)> {
        let index = self.find_index(hash, eq)?;
        self.remove_at(index)
    }

    /// Removes the entry a handle refers to.
    ///
    /// Invalid, stale and foreign handles are ignored and yield `None`.
    pub fn remove_handle(&mut self, handle: Handle) -> Option<(K, V)> {
        let index = self.index_of(handle)?;
        self.remove_at(index)
    }

    /// Empties slot `index` and shifts the rest of its cluster back by one.
    fn remove_at(&mut self, index: usize) -> Option<(K, V)> {
        let removed = mem::replace(&mut self.slots[index], Slot::Empty).into_bucket()?;
        self.touch();
        self.populated -= 1;

        let capacity = self.slots.len();
        let mut hole = index;
        loop {
            let next = if hole + 1 == capacity { 0 } else { hole + 1 };
            match self.slots[next].as_bucket_mut() {
                Some(bucket) if bucket.distance > 0 => bucket.distance -= 1,
                _ => break,
            }
            self.slots.swap(hole, next);
            hole = next;
        }

        Some((removed.key, removed.value))
    }

    #[cold]
    #[inline(never)]
    fn grow(&mut self) {
        let capacity = grown_capacity(self.slots.len());
        log_event!(
            old_capacity = self.slots.len(),
            new_capacity = capacity,
            len = self.populated,
            "load factor exceeded, growing table"
        );
        self.rebuild(empty_slots(capacity));
    }

    /// Moves every entry into `slots`, which must have room for all of them.
    fn rebuild(&mut self, slots: Vec<Slot<K, V>>) {
        debug_assert!(slots.len() >= self.populated);

        self.touch();
        let old = mem::replace(&mut self.slots, slots);
        self.populated = 0;
        for mut bucket in old.into_iter().filter_map(Slot::into_bucket) {
            bucket.distance = 0;
            self.probe_insert(bucket, |_, _| false, false);
        }
    }

    /// Rebuilds the table with exactly `new_capacity` slots, or with `len()`
    /// slots if `new_capacity` is smaller.
    ///
    /// Entries are re-inserted without load-factor checks, so the resulting
    /// capacity is the clamped request even if that leaves the table full.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_map::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(10);
    /// for k in 0..10u64 {
    ///     table.insert(k, k, (), |a, b| a == b);
    /// }
    ///
    /// table.resize(4);
    /// assert_eq!(table.capacity(), 10);
    /// assert!(table.find(9, |&k| k == 9).is_valid());
    /// ```
    pub fn resize(&mut self, new_capacity: usize) {
        let new_capacity = new_capacity.max(self.populated);
        log_event!(
            old_capacity = self.slots.len(),
            new_capacity,
            len = self.populated,
            "resizing table"
        );
        self.rebuild(empty_slots(new_capacity));
    }

    /// Makes room for `expected` elements in total.
    ///
    /// Grows the table to [`capacity_for(expected)`](capacity_for) slots if it
    /// is currently smaller; never shrinks it.
    pub fn reserve(&mut self, expected: usize) {
        let capacity = capacity_for(expected);
        if capacity > self.slots.len() {
            self.resize(capacity);
        }
    }

    /// Fallible counterpart of [`reserve`](Self::reserve).
    ///
    /// The new storage is allocated before any entry moves, so on error the
    /// table is left untouched and outstanding handles stay valid.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_map::TryReserveError;
    /// # use robin_map::hash_table::HashTable;
    /// #
    /// let mut table: HashTable<u64, u64> = HashTable::with_capacity(0);
    /// assert!(table.try_reserve(100).is_ok());
    /// assert!(table.capacity() >= 100);
    ///
    /// assert_eq!(
    ///     table.try_reserve(usize::MAX),
    ///     Err(TryReserveError::CapacityOverflow)
    /// );
    /// ```
    pub fn try_reserve(&mut self, expected: usize) -> Result<(), TryReserveError> {
        let capacity = capacity_for(expected);
        if capacity <= self.slots.len() {
            return Ok(());
        }

        match try_empty_slots(capacity) {
            Ok(slots) => {
                self.rebuild(slots);
                Ok(())
            }
            Err(error) => {
                log_event!(capacity, %error, "failed to reserve table storage");
                Err(error)
            }
        }
    }

    /// Shrinks the table to the capacity it would have been created with for
    /// its current length.
    pub fn shrink_to_fit(&mut self) {
        let capacity = capacity_for(self.populated);
        if capacity < self.slots.len() {
            self.resize(capacity);
        }
    }

    /// Removes all elements, keeping the allocated slots.
    pub fn clear(&mut self) {
        self.touch();
        if self.populated == 0 {
            return;
        }

        for slot in self.slots.iter_mut() {
            *slot = Slot::Empty;
        }
        self.populated = 0;
    }

    /// Keeps only the entries for which `f` returns `true`.
    ///
    /// Kept entries are re-placed into fresh storage of the same capacity, so
    /// `f` is called exactly once per entry.
    pub fn retain(&mut self, mut f: impl FnMut(&K, &mut V) -> bool) {
        let capacity = self.slots.len();
        self.touch();
        let old = mem::replace(&mut self.slots, empty_slots(capacity));
        self.populated = 0;
        for mut bucket in old.into_iter().filter_map(Slot::into_bucket) {
            if f(&bucket.key, &mut bucket.value) {
                bucket.distance = 0;
                self.probe_insert(bucket, |_, _| false, false);
            }
        }
    }

    /// Gets an entry for the given hash and equality predicate.
    ///
    /// Looking up an entry never changes the table. Inserting through the
    /// returned [`VacantEntry`] follows the same growth rule as
    /// [`insert`](Self::insert).
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use robin_map::hash_table::Entry;
    /// # use robin_map::hash_table::HashTable;
    /// #
    /// let mut table = HashTable::with_capacity(10);
    ///
    /// match table.entry(5, |&k: &u64| k == 5) {
    ///     Entry::Vacant(entry) => {
    ///         entry.insert(5, "five".to_string());
    ///     }
    ///     Entry::Occupied(_) => unreachable!(),
    /// }
    ///
    /// table
    ///     .entry(5, |&k| k == 5)
    ///     .and_modify(|v| v.push('!'))
    ///     .or_insert(5, String::new());
    /// assert_eq!(table.get(5, |&k| k == 5), Some((&5, &"five!".to_string())));
    /// ```
    pub fn entry(&mut self, hash: u64, eq: impl Fn(&K) -> bool) -> Entry<'_, K, V> {
        if let Some(index) = self.find_index(hash, &eq) {
            return Entry::Occupied(OccupiedEntry { table: self, index });
        }
        Entry::Vacant(VacantEntry { table: self, hash })
    }

    /// Returns an iterator over all entries in an arbitrary order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            slots: self.slots.iter(),
            remaining: self.populated,
        }
    }

    /// Returns an iterator over all entries with mutable values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            slots: self.slots.iter_mut(),
            remaining: self.populated,
        }
    }

    /// Removes and yields every entry, keeping the table's capacity.
    ///
    /// The table is empty as soon as `drain` returns, whether or not the
    /// iterator is consumed.
    pub fn drain(&mut self) -> Drain<'_, K, V> {
        let capacity = self.slots.len();
        let remaining = self.populated;
        self.touch();
        self.populated = 0;
        let slots = mem::replace(&mut self.slots, empty_slots(capacity));

        Drain {
            inner: IntoIter {
                slots: slots.into_iter(),
                remaining,
            },
            _marker: PhantomData,
        }
    }

    /// Computes how many entries sit at each displacement from their home
    /// bucket.
    #[cfg(any(test, feature = "stats"))]
    pub fn probe_histogram(&self) -> ProbeHistogram {
        let mut counts = Vec::new();
        for bucket in self.slots.iter().filter_map(Slot::as_bucket) {
            if counts.len() <= bucket.distance {
                counts.resize(bucket.distance + 1, 0);
            }
            counts[bucket.distance] += 1;
        }

        ProbeHistogram { counts }
    }

    /// Returns utilization statistics for the table.
    #[cfg(any(test, feature = "stats"))]
    pub fn debug_stats(&self) -> DebugStats {
        let capacity = self.slots.len();
        let slot_bytes = mem::size_of::<Slot<K, V>>();

        let mut max_probe_length = 0;
        let mut total_distance = 0;
        for bucket in self.slots.iter().filter_map(Slot::as_bucket) {
            max_probe_length = max_probe_length.max(bucket.distance);
            total_distance += bucket.distance;
        }

        DebugStats {
            populated: self.populated,
            capacity,
            max_load: (capacity as u128 * MAX_LOAD_NUMERATOR / MAX_LOAD_DENOMINATOR) as usize,
            load_factor: if capacity == 0 {
                0.0
            } else {
                self.populated as f64 / capacity as f64
            },
            max_probe_length,
            mean_probe_length: if self.populated == 0 {
                0.0
            } else {
                total_distance as f64 / self.populated as f64
            },
            total_bytes: capacity * slot_bytes,
            wasted_bytes: (capacity - self.populated) * slot_bytes,
        }
    }

    /// Asserts every structural invariant of the table.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let capacity = self.slots.len();
        let mut occupied = 0;
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(bucket) = slot.as_bucket() else {
                continue;
            };
            occupied += 1;

            let home = self.home(bucket.hash);
            assert_eq!(
                bucket.distance,
                (index + capacity - home) % capacity,
                "slot {index} has the wrong displacement: {self:#?}"
            );

            if bucket.distance > 0 {
                let previous = if index == 0 { capacity - 1 } else { index - 1 };
                let before = self.slots[previous]
                    .as_bucket()
                    .expect("displaced entry follows an empty slot");
                assert!(
                    before.distance + 1 >= bucket.distance,
                    "slot {index} is poorer than the slot before it: {self:#?}"
                );
            }
        }

        assert_eq!(occupied, self.populated);
        assert!(self.populated <= capacity);
    }
}

/// Number of entries at each displacement from their home bucket.
///
/// `counts[d]` is the number of entries sitting `d` slots past their home.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeHistogram {
    /// Entry counts indexed by displacement.
    pub counts: Vec<usize>,
}

#[cfg(any(test, feature = "stats"))]
impl ProbeHistogram {
    /// Pretty-prints the histogram as a horizontal bar chart.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        let max = self.counts.iter().copied().max().unwrap_or(0);
        if max == 0 {
            println!("probe histogram: empty");
            return;
        }

        let max_bar = 60usize;
        let total_units = max_bar * 8;
        println!(
            "probe histogram ({} entries):",
            self.counts.iter().sum::<usize>()
        );

        let make_bar = |count: usize| -> alloc::string::String {
            if count == 0 {
                return alloc::string::String::new();
            }
            let units = ((count as u128 * total_units as u128).div_ceil(max as u128)) as usize;
            let mut bar = "█".repeat(units / 8);
            let partial = match units % 8 {
                1 => Some('▏'),
                2 => Some('▎'),
                3 => Some('▍'),
                4 => Some('▌'),
                5 => Some('▋'),
                6 => Some('▊'),
                7 => Some('▉'),
                _ => None,
            };
            bar.extend(partial);
            bar
        };

        for (distance, &count) in self.counts.iter().enumerate() {
            println!("{:>3} | {} ({})", distance, make_bar(count), count);
        }
    }
}

/// Utilization statistics for a [`HashTable`].
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone)]
pub struct DebugStats {
    /// Number of elements currently in the table
    pub populated: usize,
    /// Number of slots
    pub capacity: usize,
    /// Largest element count that does not trigger growth on the next insert
    pub max_load: usize,
    /// Load factor (populated / capacity)
    pub load_factor: f64,
    /// Largest displacement of any entry
    pub max_probe_length: usize,
    /// Average displacement over all entries
    pub mean_probe_length: f64,
    /// Total memory in bytes used by the slot array
    pub total_bytes: usize,
    /// Memory in bytes held by empty slots
    pub wasted_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl DebugStats {
    /// Pretty-print the debug statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Hash Table Debug Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% load factor, grows past {})",
            self.populated,
            self.capacity,
            self.load_factor * 100.0,
            self.max_load
        );
        println!(
            "Probe length: max {}, mean {:.3}",
            self.max_probe_length, self.mean_probe_length
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
        println!(
            "Memory: {} bytes wasted ({:.02}%)",
            self.wasted_bytes,
            if self.total_bytes == 0 {
                0.0
            } else {
                (self.wasted_bytes as f64 / self.total_bytes as f64) * 100.0
            }
        );
    }
}

/// A view into a single entry in the table, which may be vacant or occupied.
///
/// Constructed by [`HashTable::entry`].
pub enum Entry<'a, K, V> {
    /// No entry matched the predicate.
    Vacant(VacantEntry<'a, K, V>),
    /// An entry matched the predicate.
    Occupied(OccupiedEntry<'a, K, V>),
}

impl<'a, K, V> Entry<'a, K, V> {
    /// Inserts `key` and `default` if the entry is vacant, and returns a
    /// mutable reference to the value.
    pub fn or_insert(self, key: K, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(key, default),
        }
    }

    /// Inserts the pair computed by `default` if the entry is vacant.
    pub fn or_insert_with(self, default: impl FnOnce() -> (K, V)) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let (key, value) = default();
                entry.insert(key, value)
            }
        }
    }

    /// Applies `f` to the value if the entry is occupied.
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Self {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }
}

/// A view into a vacant entry in the table.
pub struct VacantEntry<'a, K, V> {
    table: &'a mut HashTable<K, V>,
    hash: u64,
}

impl<'a, K, V> VacantEntry<'a, K, V> {
    /// Returns the hash this entry was looked up with.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Inserts the pair and returns a mutable reference to the value.
    ///
    /// The caller is responsible for `key` actually hashing to
    /// [`hash`](Self::hash).
    pub fn insert(self, key: K, value: V) -> &'a mut V {
        let table = self.table;
        table.touch();
        let (index, _) = table.insert_growing(
            Bucket {
                hash: self.hash,
                distance: 0,
                key,
                value,
            },
            |_, _| false,
        );

        match &mut table.slots[index] {
            Slot::Occupied(bucket) => &mut bucket.value,
            Slot::Empty => unreachable!("freshly inserted slot {index} is empty"),
        }
    }
}

/// A view into an occupied entry in the table.
pub struct OccupiedEntry<'a, K, V> {
    table: &'a mut HashTable<K, V>,
    index: usize,
}

impl<'a, K, V> OccupiedEntry<'a, K, V> {
    fn bucket(&self) -> &Bucket<K, V> {
        match &self.table.slots[self.index] {
            Slot::Occupied(bucket) => bucket,
            Slot::Empty => unreachable!("occupied entry points at empty slot {}", self.index),
        }
    }

    fn bucket_mut(&mut self) -> &mut Bucket<K, V> {
        match &mut self.table.slots[self.index] {
            Slot::Occupied(bucket) => bucket,
            Slot::Empty => unreachable!("occupied entry points at empty slot {}", self.index),
        }
    }

    /// Returns a handle to this entry, valid until the table is next mutated.
    pub fn handle(&self) -> Handle {
        self.table.handle_at(self.index)
    }

    /// Gets a reference to the key in the entry.
    pub fn key(&self) -> &K {
        &self.bucket().key
    }

    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        &self.bucket().value
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        &mut self.bucket_mut().value
    }

    /// Converts the entry into a mutable reference to the value.
    pub fn into_mut(self) -> &'a mut V {
        match &mut self.table.slots[self.index] {
            Slot::Occupied(bucket) => &mut bucket.value,
            Slot::Empty => unreachable!("occupied entry points at empty slot {}", self.index),
        }
    }

    /// Replaces the value, returning the old one.
    pub fn insert(&mut self, value: V) -> V {
        self.table.touch();
        mem::replace(self.get_mut(), value)
    }

    /// Removes the entry from the table and returns it.
    pub fn remove(self) -> (K, V) {
        match self.table.remove_at(self.index) {
            Some(pair) => pair,
            None => unreachable!("occupied entry points at empty slot {}", self.index),
        }
    }
}

/// An iterator over the entries of a [`HashTable`], created by
/// [`HashTable::iter`].
pub struct Iter<'a, K, V> {
    slots: core::slice::Iter<'a, Slot<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let bucket = self.slots.find_map(Slot::as_bucket)?;
        self.remaining -= 1;
        Some((&bucket.key, &bucket.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// A mutable iterator over the entries of a [`HashTable`], created by
/// [`HashTable::iter_mut`].
pub struct IterMut<'a, K, V> {
    slots: core::slice::IterMut<'a, Slot<K, V>>,
    remaining: usize,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        let Bucket { key, value, .. } = self.slots.find_map(Slot::as_bucket_mut)?;
        self.remaining -= 1;
        Some((&*key, value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

/// An owning iterator over the entries of a [`HashTable`].
pub struct IntoIter<K, V> {
    slots: alloc::vec::IntoIter<Slot<K, V>>,
    remaining: usize,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let bucket = self.slots.find_map(Slot::into_bucket)?;
        self.remaining -= 1;
        Some((bucket.key, bucket.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}

impl<K, V> IntoIterator for HashTable<K, V> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            remaining: self.populated,
            slots: self.slots.into_iter(),
        }
    }
}

/// A draining iterator over the entries of a [`HashTable`], created by
/// [`HashTable::drain`].
pub struct Drain<'a, K, V> {
    inner: IntoIter<K, V>,
    _marker: PhantomData<&'a mut HashTable<K, V>>,
}

impl<K, V> Iterator for Drain<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Drain<'_, K, V> {}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec;
    use core::hash::Hasher;

    use rand::Rng;
    use rand::SeedableRng;
    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use rand::rngs::SmallRng;
    use siphasher::sip::SipHasher;

    use super::*;

    struct HashState {
        k0: u64,
        k1: u64,
    }

    impl HashState {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap(),
                k1: rng.try_next_u64().unwrap(),
            }
        }

        fn build_hasher(&self) -> SipHasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    fn hash_key(state: &HashState, key: u64) -> u64 {
        let mut h = state.build_hasher();
        h.write_u64(key);
        h.finish()
    }

    fn same(a: &u64, b: &u64) -> bool {
        a == b
    }

    /// Inserts `key` with the identity hash `hash(k) = k`.
    fn insert_identity(table: &mut HashTable<u64, u64>, key: u64, value: u64) -> Option<u64> {
        table.insert(key, key, value, same)
    }

    fn find_identity(table: &HashTable<u64, u64>, key: u64) -> Handle {
        table.find(key, |&k| k == key)
    }

    #[test]
    fn capacity_formula() {
        assert_eq!(capacity_for(0), 3);
        assert_eq!(capacity_for(1), 3);
        assert_eq!(capacity_for(4), 7);
        assert_eq!(capacity_for(15), 21);
        assert_eq!(capacity_for(16), 23);
        assert_eq!(capacity_for(usize::MAX), usize::MAX);
        for expected in 0..500 {
            assert_eq!(capacity_for(expected) % 2, 1, "{expected}");
        }
    }

    #[test]
    fn insert_and_find() {
        let state = HashState::default();
        let mut table: HashTable<u64, i32> = HashTable::with_capacity(0);
        for k in 0..64u64 {
            let hash = hash_key(&state, k);
            assert_eq!(table.insert(hash, k, (k as i32) * 2, same), None);
            let handle = table.find(hash, |&v| v == k);
            assert_eq!(table.resolve(handle), Some((&k, &((k as i32) * 2))), "{table:#?}");
            table.check_invariants();
        }

        assert_eq!(table.len(), 64);
        for k in 0..64u64 {
            let hash = hash_key(&state, k);
            assert_eq!(table.get(hash, |&v| v == k), Some((&k, &((k as i32) * 2))));
        }

        let miss_hash = hash_key(&state, 999);
        assert!(!table.find(miss_hash, |&v| v == 999).is_valid());
        assert_eq!(table.get(miss_hash, |&v| v == 999), None);
    }

    #[test]
    fn upsert_keeps_size() {
        let mut table = HashTable::with_capacity(4);
        assert_eq!(insert_identity(&mut table, 1, 10), None);
        assert_eq!(insert_identity(&mut table, 1, 11), Some(10));
        assert_eq!(table.len(), 1);
        assert_eq!(table.value(find_identity(&table, 1)), Some(&11));
        table.check_invariants();
    }

    #[test]
    fn twenty_one_identity_keys_from_expected_fifteen() {
        let mut table = HashTable::with_capacity(15);
        assert_eq!(table.capacity(), 21);

        // Every key lands in its own empty home slot, so none of them grows
        // the table even though it ends up full.
        for k in 0..21u64 {
            assert_eq!(insert_identity(&mut table, k, k * 100), None);
            table.check_invariants();
        }
        assert_eq!(table.len(), 21);
        assert_eq!(table.capacity(), 21);
        for k in 0..21u64 {
            assert_eq!(table.value(find_identity(&table, k)), Some(&(k * 100)));
        }

        // Key 21 collides with key 0 in slot 0 while the table is over its
        // load limit.
        insert_identity(&mut table, 21, 2100);
        assert_eq!(table.capacity(), 43);
        assert_eq!(table.len(), 22);
        for k in 0..22u64 {
            assert_eq!(table.value(find_identity(&table, k)), Some(&(k * 100)));
        }
        table.check_invariants();
    }

    #[test]
    fn growth_waits_for_a_collision() {
        let mut table = HashTable::with_capacity(15);
        for k in 0..17u64 {
            insert_identity(&mut table, k, k);
        }
        assert_eq!(table.capacity(), 21);

        // 17 entries are over 0.77 * 21, but slot 18 is empty.
        insert_identity(&mut table, 18, 18);
        assert_eq!(table.capacity(), 21);

        // Home slot 18 is taken by key 18.
        insert_identity(&mut table, 39, 39);
        assert_eq!(table.capacity(), 43);
        assert_eq!(table.len(), 19);
        table.check_invariants();
    }

    #[test]
    fn upsert_never_grows() {
        let mut table = HashTable::with_capacity(4);
        for k in 0..6u64 {
            insert_identity(&mut table, k, k);
        }
        assert_eq!(table.capacity(), 7);

        assert_eq!(insert_identity(&mut table, 0, 99), Some(0));
        assert_eq!(table.capacity(), 7);
        assert_eq!(table.len(), 6);

        // A new key colliding with key 0 does grow it.
        insert_identity(&mut table, 7, 7);
        assert_eq!(table.capacity(), 15);
        assert_eq!(table.value(find_identity(&table, 0)), Some(&99));
        table.check_invariants();
    }

    #[test]
    fn remove_shifts_collider_back() {
        // Capacity 7: keys 3 and 10 share home bucket 3.
        let mut table = HashTable::with_capacity(4);
        assert_eq!(table.capacity(), 7);
        insert_identity(&mut table, 3, 30);
        insert_identity(&mut table, 10, 100);

        let b = find_identity(&table, 10);
        assert_eq!(b.slot(), Some(4));
        assert_eq!(table.displacement(b), Some(1));

        assert_eq!(table.remove(3, |&k| k == 3), Some((3, 30)));
        table.check_invariants();

        let b = find_identity(&table, 10);
        assert_eq!(table.value(b), Some(&100));
        assert_eq!(b.slot(), Some(3));
        assert_eq!(table.displacement(b), Some(0));
    }

    #[test]
    fn remove_shift_wraps_around() {
        let mut table = HashTable::with_capacity(4);
        insert_identity(&mut table, 6, 1);
        insert_identity(&mut table, 13, 2);
        insert_identity(&mut table, 20, 3);

        assert_eq!(find_identity(&table, 13).slot(), Some(0));
        assert_eq!(find_identity(&table, 20).slot(), Some(1));

        table.remove(6, |&k| k == 6);
        table.check_invariants();
        assert_eq!(find_identity(&table, 13).slot(), Some(6));
        assert_eq!(find_identity(&table, 20).slot(), Some(0));
    }

    #[test]
    fn robin_hood_displaces_richer_entry() {
        let mut table = HashTable::with_capacity(4);
        // Two entries with home 0 fill slots 0 and 1.
        insert_identity(&mut table, 0, 0);
        insert_identity(&mut table, 7, 7);
        // Home 1 is taken by a poorer entry, so this one lands in slot 2.
        insert_identity(&mut table, 1, 1);
        assert_eq!(find_identity(&table, 1).slot(), Some(2));

        // A third home-0 entry is poorer than key 1 at slot 2 and evicts it.
        insert_identity(&mut table, 14, 14);
        table.check_invariants();

        let evictor = find_identity(&table, 14);
        let evicted = find_identity(&table, 1);
        assert_eq!(evictor.slot(), Some(2));
        assert_eq!(table.displacement(evictor), Some(2));
        assert_eq!(evicted.slot(), Some(3));
        assert_eq!(table.displacement(evicted), Some(2));
    }

    #[test]
    fn explicit_collision() {
        let mut table: HashTable<u64, i32> = HashTable::with_capacity(0);
        let hash = 0;
        for k in 0..65u64 {
            table.insert(hash, k, k as i32, same);
        }

        assert_eq!(table.len(), 65);
        table.check_invariants();
        for k in 0..65u64 {
            assert_eq!(table.get(hash, |&v| v == k), Some((&k, &(k as i32))), "{table:#?}");
        }

        for k in (0..65u64).step_by(3) {
            assert_eq!(table.remove(hash, |&v| v == k), Some((k, k as i32)));
            table.check_invariants();
        }
        assert_eq!(table.len(), 43);
    }

    #[test]
    fn handles_go_stale_after_mutation() {
        let mut table = HashTable::with_capacity(8);
        insert_identity(&mut table, 1, 1);
        let handle = find_identity(&table, 1);
        assert!(table.contains_handle(handle));

        insert_identity(&mut table, 2, 2);
        assert!(handle.is_valid());
        assert!(!table.contains_handle(handle));
        assert_eq!(table.value(handle), None);
        assert_eq!(table.remove_handle(handle), None);
        assert_eq!(table.len(), 2);

        let handle = find_identity(&table, 1);
        table.resize(20);
        assert_eq!(table.key(handle), None);

        let handle = find_identity(&table, 1);
        table.clear();
        assert_eq!(table.key(handle), None);
    }

    #[test]
    fn value_mut_keeps_handles_valid() {
        let mut table = HashTable::with_capacity(8);
        insert_identity(&mut table, 1, 1);
        let handle = find_identity(&table, 1);

        *table.value_mut(handle).unwrap() = 5;
        assert_eq!(table.value(handle), Some(&5));
    }

    #[test]
    fn handles_from_other_tables_are_rejected() {
        let mut a = HashTable::with_capacity(8);
        let mut b = HashTable::with_capacity(8);
        insert_identity(&mut a, 1, 1);
        insert_identity(&mut b, 1, 1);

        let from_a = find_identity(&a, 1);
        assert_eq!(b.value(from_a), None);
        assert_eq!(b.remove_handle(from_a), None);
        assert_eq!(b.len(), 1);

        let cloned = a.clone();
        assert_eq!(cloned.value(from_a), None);
        assert_eq!(a.value(from_a), Some(&1));
    }

    #[test]
    fn invalid_handle_is_noop() {
        let mut table = HashTable::with_capacity(8);
        insert_identity(&mut table, 1, 1);
        assert_eq!(table.remove_handle(Handle::INVALID), None);
        assert_eq!(table.len(), 1);
        assert_eq!(table.resolve(Handle::INVALID), None);
    }

    #[test]
    fn resize_clamps_to_len() {
        let mut table = HashTable::with_capacity(10);
        for k in 0..10u64 {
            insert_identity(&mut table, k * 7, k);
        }

        table.resize(2);
        assert_eq!(table.capacity(), 10);
        table.check_invariants();
        for k in 0..10u64 {
            assert_eq!(table.value(find_identity(&table, k * 7)), Some(&k));
        }
        assert!(!find_identity(&table, 3).is_valid());

        // Key 100 collides in a full table, which grows it.
        insert_identity(&mut table, 100, 100);
        assert_eq!(table.capacity(), 21);
        assert_eq!(table.len(), 11);
        table.check_invariants();
    }

    #[test]
    fn zero_capacity_table_grows_on_insert() {
        let mut table: HashTable<u64, u64> = HashTable::with_capacity(0);
        table.resize(0);
        assert_eq!(table.capacity(), 0);
        assert!(!find_identity(&table, 1).is_valid());
        assert!(!table.first().is_valid());

        insert_identity(&mut table, 1, 1);
        assert_eq!(table.capacity(), 1);
        insert_identity(&mut table, 2, 2);
        assert_eq!(table.capacity(), 3);
        assert_eq!(table.len(), 2);
        table.check_invariants();
    }

    #[test]
    fn reserve_only_grows() {
        let mut table: HashTable<u64, u64> = HashTable::with_capacity(100);
        let capacity = table.capacity();
        table.reserve(10);
        assert_eq!(table.capacity(), capacity);

        table.reserve(1000);
        assert_eq!(table.capacity(), capacity_for(1000));
    }

    #[test]
    fn try_reserve_overflow_leaves_table_intact() {
        let mut table = HashTable::with_capacity(4);
        insert_identity(&mut table, 1, 1);
        let handle = find_identity(&table, 1);

        assert_eq!(
            table.try_reserve(usize::MAX),
            Err(TryReserveError::CapacityOverflow)
        );
        assert_eq!(table.capacity(), 7);
        assert_eq!(table.value(handle), Some(&1));

        assert_eq!(table.try_reserve(50), Ok(()));
        assert_eq!(table.capacity(), capacity_for(50));
        assert_eq!(table.value(find_identity(&table, 1)), Some(&1));
    }

    #[test]
    fn shrink_to_fit_after_removals() {
        let mut table = HashTable::with_capacity(0);
        for k in 0..1000u64 {
            insert_identity(&mut table, k, k);
        }
        for k in 10..1000u64 {
            table.remove(k, |&v| v == k);
        }

        table.shrink_to_fit();
        assert_eq!(table.capacity(), capacity_for(10));
        table.check_invariants();
        for k in 0..10u64 {
            assert_eq!(table.value(find_identity(&table, k)), Some(&k));
        }
    }

    #[test]
    fn first_drains_the_table() {
        let state = HashState::default();
        let mut table = HashTable::with_capacity(0);
        for k in 0..50u64 {
            table.insert(hash_key(&state, k), k, k, same);
        }

        let mut seen = vec![false; 50];
        loop {
            let handle = table.first();
            let Some((key, _)) = table.remove_handle(handle) else {
                break;
            };
            assert!(!seen[key as usize]);
            seen[key as usize] = true;
            table.check_invariants();
        }
        assert!(seen.iter().all(|&s| s));
        assert!(table.is_empty());
    }

    #[test]
    fn retain_visits_each_entry_once() {
        let mut table = HashTable::with_capacity(0);
        for k in 0..200u64 {
            // Heavy clustering around a few home buckets.
            table.insert(k % 5, k, k, same);
        }

        let mut calls = 0;
        table.retain(|&k, v| {
            calls += 1;
            *v += 1;
            k % 2 == 0
        });

        assert_eq!(calls, 200);
        assert_eq!(table.len(), 100);
        table.check_invariants();
        for k in (0..200u64).step_by(2) {
            assert_eq!(table.get(k % 5, |&v| v == k), Some((&k, &(k + 1))));
        }
    }

    #[test]
    fn entry_or_insert_with() {
        let mut table: HashTable<String, usize> = HashTable::with_capacity(0);
        for word in ["a", "b", "a", "c", "a", "b"] {
            let hash = word.len() as u64;
            *table
                .entry(hash, |k| k == word)
                .or_insert_with(|| (word.to_string(), 0)) += 1;
            table.check_invariants();
        }

        assert_eq!(table.len(), 3);
        assert_eq!(table.get(1, |k| k == "a").map(|(_, v)| *v), Some(3));
        assert_eq!(table.get(1, |k| k == "b").map(|(_, v)| *v), Some(2));
        assert_eq!(table.get(1, |k| k == "c").map(|(_, v)| *v), Some(1));
    }

    #[test]
    fn vacant_entry_grows_on_collision() {
        let mut table = HashTable::with_capacity(15);
        for k in 0..21u64 {
            insert_identity(&mut table, k, k);
        }

        // Looking up the entry leaves the full table alone.
        let Entry::Vacant(entry) = table.entry(21, |&k| k == 21) else {
            panic!("key 21 should be vacant");
        };
        assert_eq!(entry.table.capacity(), 21);

        assert_eq!(*entry.insert(21, 210), 210);
        assert_eq!(table.capacity(), 43);
        assert_eq!(table.value(find_identity(&table, 21)), Some(&210));
        table.check_invariants();
    }

    #[test]
    fn vacant_entry_with_free_home_slot_does_not_grow() {
        let mut table = HashTable::with_capacity(15);
        for k in 0..17u64 {
            insert_identity(&mut table, k, k);
        }

        match table.entry(18, |&k| k == 18) {
            Entry::Vacant(entry) => *entry.insert(18, 180) += 1,
            Entry::Occupied(_) => panic!("key 18 should be vacant"),
        }
        assert_eq!(table.capacity(), 21);
        assert_eq!(table.value(find_identity(&table, 18)), Some(&181));
    }

    #[test]
    fn vacant_insert_returns_the_displacing_slot() {
        let mut table = HashTable::with_capacity(4);
        insert_identity(&mut table, 0, 0);
        insert_identity(&mut table, 7, 7);
        insert_identity(&mut table, 1, 1);

        // Key 14 evicts key 1 from slot 2; the returned reference must be 14's.
        match table.entry(14, |&k| k == 14) {
            Entry::Vacant(entry) => *entry.insert(14, 140) += 1,
            Entry::Occupied(_) => panic!("key 14 should be vacant"),
        }
        assert_eq!(table.value(find_identity(&table, 14)), Some(&141));
        assert_eq!(table.value(find_identity(&table, 1)), Some(&1));
    }

    #[test]
    fn occupied_entry_operations() {
        let mut table = HashTable::with_capacity(4);
        insert_identity(&mut table, 3, 30);
        insert_identity(&mut table, 10, 100);

        match table.entry(3, |&k| k == 3) {
            Entry::Occupied(mut entry) => {
                assert_eq!(entry.key(), &3);
                assert_eq!(entry.get(), &30);
                assert_eq!(entry.insert(31), 30);
                assert_eq!(entry.remove(), (3, 31));
            }
            Entry::Vacant(_) => panic!("key 3 should be occupied"),
        }

        table.check_invariants();
        assert_eq!(table.len(), 1);
        assert_eq!(find_identity(&table, 10).slot(), Some(3));
    }

    #[test]
    fn iter_and_drain() {
        let state = HashState::default();
        let mut table = HashTable::with_capacity(0);
        for k in 10..20u64 {
            table.insert(hash_key(&state, k), k, k * 2, same);
        }

        let mut keys: Vec<u64> = table.iter().map(|(&k, _)| k).collect();
        keys.sort_unstable();
        assert_eq!(keys, (10..20).collect::<Vec<_>>());
        assert_eq!(table.iter().len(), 10);

        for (_, v) in table.iter_mut() {
            *v += 1;
        }
        assert!(table.iter().all(|(&k, &v)| v == k * 2 + 1));

        let capacity = table.capacity();
        let drained: Vec<(u64, u64)> = table.drain().collect();
        assert_eq!(drained.len(), 10);
        assert!(table.is_empty());
        assert_eq!(table.capacity(), capacity);
    }

    #[test]
    fn dropped_drain_still_empties() {
        let mut table = HashTable::with_capacity(0);
        for k in 0..10u64 {
            insert_identity(&mut table, k, k);
        }

        let mut drain = table.drain();
        assert!(drain.next().is_some());
        drop(drain);
        assert!(table.is_empty());
        assert!(!table.first().is_valid());

        insert_identity(&mut table, 3, 3);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn string_keys() {
        let state = HashState::default();
        let hash_str = |s: &str| {
            let mut h = state.build_hasher();
            h.write(s.as_bytes());
            h.finish()
        };

        let mut table: HashTable<String, usize> = HashTable::with_capacity(0);
        let words = ["apple", "banana", "cherry", "date", "elderberry"];
        for (i, word) in words.iter().enumerate() {
            table.insert(hash_str(word), word.to_string(), i, |a, b| a == b);
        }
        for (i, word) in words.iter().enumerate() {
            assert_eq!(table.get(hash_str(word), |k| k == word).map(|(_, v)| *v), Some(i));
        }
        assert_eq!(table.remove(hash_str("cherry"), |k| k == "cherry").map(|(_, v)| v), Some(2));
        assert!(!table.find(hash_str("cherry"), |k| k == "cherry").is_valid());
        table.check_invariants();
    }

    #[test]
    fn clone_is_independent() {
        let mut table = HashTable::with_capacity(0);
        for k in 0..20u64 {
            insert_identity(&mut table, k, k);
        }

        let mut cloned = table.clone();
        cloned.remove(5, |&k| k == 5);
        insert_identity(&mut cloned, 100, 100);

        assert_eq!(table.len(), 20);
        assert_eq!(cloned.len(), 20);
        assert!(find_identity(&table, 5).is_valid());
        assert!(!find_identity(&table, 100).is_valid());
        cloned.check_invariants();
    }

    #[test]
    fn randomized_operations_match_model() {
        let seed = OsRng.try_next_u64().unwrap();
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut table: HashTable<u64, u64> = HashTable::with_capacity(0);
        let mut model = hashbrown::HashMap::new();

        for step in 0..5000 {
            // Small key space and coarse hashes force long clusters.
            let key = rng.random_range(0..300u64);
            let hash = key % 37;
            match rng.random_range(0..10) {
                0..=5 => {
                    let value = rng.random::<u64>();
                    assert_eq!(
                        table.insert(hash, key, value, same),
                        model.insert(key, value),
                        "seed {seed} step {step}"
                    );
                }
                6..=8 => {
                    assert_eq!(
                        table.remove(hash, |&k| k == key).map(|(_, v)| v),
                        model.remove(&key),
                        "seed {seed} step {step}"
                    );
                }
                _ => {
                    let handle = table.first();
                    if let Some((k, _)) = table.remove_handle(handle) {
                        assert!(model.remove(&k).is_some(), "seed {seed} step {step}");
                    } else {
                        assert!(model.is_empty());
                    }
                }
            }

            table.check_invariants();
            assert_eq!(table.len(), model.len(), "seed {seed} step {step}");
        }

        for (&key, &value) in &model {
            assert_eq!(table.get(key % 37, |&k| k == key), Some((&key, &value)), "seed {seed}");
        }
    }

    #[test]
    #[cfg_attr(miri, ignore)]
    fn insert_many() {
        let state = HashState::default();
        let mut table = HashTable::with_capacity(0);
        for k in 0..100_000u64 {
            table.insert(hash_key(&state, k), k, k, same);
        }

        assert_eq!(table.len(), 100_000);
        for k in 0..100_000u64 {
            assert_eq!(table.value(table.find(hash_key(&state, k), |&v| v == k)), Some(&k));
        }

        let stats = table.debug_stats();
        assert!(stats.populated <= stats.capacity);
        assert_eq!(stats.populated, 100_000);
        assert_eq!(table.probe_histogram().counts.iter().sum::<usize>(), 100_000);
    }

    #[test]
    fn probe_histogram_counts_displacements() {
        let mut table = HashTable::with_capacity(4);
        insert_identity(&mut table, 0, 0);
        insert_identity(&mut table, 7, 7);
        insert_identity(&mut table, 14, 14);
        insert_identity(&mut table, 3, 3);

        assert_eq!(table.probe_histogram().counts, vec![2, 1, 1]);
        let stats = table.debug_stats();
        assert_eq!(stats.max_probe_length, 2);
        assert_eq!(stats.capacity, 7);
        assert_eq!(stats.max_load, 5);
    }

    #[test]
    #[cfg(feature = "std")]
    fn histogram_output() {
        let mut table = HashTable::with_capacity(0);
        for k in 0..100u64 {
            insert_identity(&mut table, k % 13, k);
        }
        table.probe_histogram().print();
        table.debug_stats().print();
    }

    #[test]
    fn debug_output_mentions_population() {
        let mut table = HashTable::with_capacity(0);
        insert_identity(&mut table, 1, 1);
        let rendered = alloc::format!("{table:?}");
        assert!(rendered.contains("populated: 1"), "{rendered}");

        let empty: HashTable<u64, u64> = HashTable::new();
        assert!(alloc::format!("{empty:?}").contains("empty"));
    }
}
