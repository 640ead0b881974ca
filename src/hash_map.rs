use core::borrow::Borrow;
use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;
use core::ops::Index;

use crate::DefaultHashBuilder;
use crate::error::TryReserveError;
use crate::handle::Handle;
use crate::hash_table;
use crate::hash_table::HashTable;

/// A hash map backed by the Robin Hood [`HashTable`].
///
/// `HashMap<K, V, S>` stores key-value pairs where keys implement `Hash + Eq`
/// and hashes them with a configurable hasher builder `S`. Lookups accept any
/// borrowed form of the key, as with the standard library's map.
///
/// Besides the usual map interface, lookups can return a [`Handle`] to the
/// slot holding an entry. Handles are valid until the next mutation of the
/// map and are checked on every use.
///
/// # Performance Characteristics
///
/// - **Memory**: a cached `u64` hash and a `usize` displacement per slot,
///   plus the size of `(K, V)`. Colliding inserts grow the map once more
///   than 77% of slots are occupied.
///
/// # Examples
///
/// ```rust
/// use robin_map::HashMap;
///
/// let mut scores: HashMap<String, u32> = HashMap::new();
/// scores.insert("ada".to_string(), 3);
/// scores.insert("grace".to_string(), 5);
///
/// assert_eq!(scores.get("ada"), Some(&3));
///
/// let handle = scores.find("grace");
/// *scores.value_mut(handle).unwrap() += 1;
/// assert_eq!(scores["grace"], 6);
///
/// scores.remove_handle(handle);
/// assert!(!scores.contains_key("grace"));
/// ```
#[derive(Clone)]
pub struct HashMap<K, V, S = DefaultHashBuilder> {
    table: HashTable<K, V>,
    hash_builder: S,
}

impl<K, V, S> Debug for HashMap<K, V, S>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_map().entries(self.table.iter()).finish()
    }
}

impl<K, V, S> HashMap<K, V, S> {
    /// Creates an empty map with the given hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use robin_map::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let map: HashMap<i32, String, _> = HashMap::with_hasher(SimpleHasher);
    /// assert!(map.is_empty());
    /// assert_eq!(map.capacity(), 3);
    /// ```
    pub fn with_hasher(hash_builder: S) -> Self {
        Self::with_capacity_and_hasher(0, hash_builder)
    }

    /// Creates an empty map sized for `expected` elements with the given
    /// hasher builder.
    ///
    /// The slot count is [`capacity_for(expected)`](crate::capacity_for).
    pub fn with_capacity_and_hasher(expected: usize, hash_builder: S) -> Self {
        Self {
            table: HashTable::with_capacity(expected),
            hash_builder,
        }
    }

    /// Returns a reference to the map's hasher builder.
    pub fn hasher(&self) -> &S {
        &self.hash_builder
    }

    /// Returns the number of elements in the map.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no elements.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of slots in the map.
    ///
    /// The map grows when an insert collides with another key while more
    /// than 77% of them are occupied.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes all elements from the map, keeping its capacity.
    pub fn clear(&mut self) {
        self.table.clear()
    }

    /// Rebuilds the map with exactly `new_capacity` slots, clamped to at
    /// least [`len`](Self::len).
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_map::HashMap;
    ///
    /// let mut map: HashMap<u32, u32> = (0..10).map(|i| (i, i)).collect();
    /// map.resize(100);
    /// assert_eq!(map.capacity(), 100);
    ///
    /// map.resize(0);
    /// assert_eq!(map.capacity(), 10);
    /// assert_eq!(map.get(&7), Some(&7));
    /// ```
    pub fn resize(&mut self, new_capacity: usize) {
        self.table.resize(new_capacity)
    }

    /// Grows the map so that `expected` elements fit without a further
    /// resize. Never shrinks.
    pub fn reserve(&mut self, expected: usize) {
        self.table.reserve(expected)
    }

    /// Fallible counterpart of [`reserve`](Self::reserve). On error the map
    /// is unchanged.
    pub fn try_reserve(&mut self, expected: usize) -> Result<(), TryReserveError> {
        self.table.try_reserve(expected)
    }

    /// Shrinks the map to the capacity it would have been created with for
    /// its current length.
    pub fn shrink_to_fit(&mut self) {
        self.table.shrink_to_fit()
    }

    /// Returns a handle to an arbitrary entry, or [`Handle::INVALID`] if the
    /// map is empty.
    pub fn first(&self) -> Handle {
        self.table.first()
    }

    /// Returns the key and value a handle refers to.
    ///
    /// Returns `None` for [`Handle::INVALID`], for handles minted before the
    /// last mutation of this map, and for handles from other maps.
    pub fn resolve(&self, handle: Handle) -> Option<(&K, &V)> {
        self.table.resolve(handle)
    }

    /// Mutable counterpart of [`resolve`](Self::resolve).
    pub fn resolve_mut(&mut self, handle: Handle) -> Option<(&K, &mut V)> {
        self.table.resolve_mut(handle)
    }

    /// Returns the key a handle refers to.
    pub fn key(&self, handle: Handle) -> Option<&K> {
        self.table.key(handle)
    }

    /// Returns the value a handle refers to.
    pub fn value(&self, handle: Handle) -> Option<&V> {
        self.table.value(handle)
    }

    /// Returns a mutable reference to the value a handle refers to. Handles
    /// stay valid afterwards.
    pub fn value_mut(&mut self, handle: Handle) -> Option<&mut V> {
        self.table.value_mut(handle)
    }

    /// Returns `true` if the handle still refers to an entry of this map.
    pub fn contains_handle(&self, handle: Handle) -> bool {
        self.table.contains_handle(handle)
    }

    /// Removes the entry a handle refers to, returning it. Invalid and stale
    /// handles are ignored.
    pub fn remove_handle(&mut self, handle: Handle) -> Option<(K, V)> {
        self.table.remove_handle(handle)
    }

    /// Keeps only the entries for which `f` returns `true`.
    pub fn retain(&mut self, f: impl FnMut(&K, &mut V) -> bool) {
        self.table.retain(f)
    }

    /// Returns an iterator over the entries in arbitrary order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the entries with mutable references to the
    /// values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Returns an iterator over the keys.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator over mutable references to the values.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }

    /// Removes and yields every entry, keeping the map's capacity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_map::HashMap;
    ///
    /// let mut map: HashMap<u8, char> = [(1, 'a'), (2, 'b')].into_iter().collect();
    /// let mut drained: Vec<_> = map.drain().collect();
    /// drained.sort();
    ///
    /// assert_eq!(drained, [(1, 'a'), (2, 'b')]);
    /// assert!(map.is_empty());
    /// ```
    pub fn drain(&mut self) -> Drain<'_, K, V> {
        Drain {
            inner: self.table.drain(),
        }
    }

    /// Returns the number of entries at each displacement from their home
    /// slot.
    #[cfg(feature = "stats")]
    pub fn probe_histogram(&self) -> hash_table::ProbeHistogram {
        self.table.probe_histogram()
    }

    /// Returns utilization statistics for the underlying table.
    #[cfg(feature = "stats")]
    pub fn debug_stats(&self) -> hash_table::DebugStats {
        self.table.debug_stats()
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    #[inline]
    fn hash<Q>(&self, key: &Q) -> u64
    where
        Q: Hash + ?Sized,
    {
        self.hash_builder.hash_one(key)
    }

    /// Inserts a key-value pair, returning the previous value if the key was
    /// already present. The stored key is kept in that case.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_map::HashMap;
    ///
    /// let mut map = HashMap::<&str, i32>::new();
    /// assert_eq!(map.insert("a", 1), None);
    /// assert_eq!(map.insert("a", 2), Some(1));
    /// assert_eq!(map.len(), 1);
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let hash = self.hash(&key);
        self.table.insert(hash, key, value, K::eq)
    }

    /// Returns a handle to the entry for `key`, or [`Handle::INVALID`].
    pub fn find<Q>(&self, key: &Q) -> Handle
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.find(self.hash(key), |k| k.borrow() == key)
    }

    /// Returns a reference to the value for `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_key_value(key).map(|(_, value)| value)
    }

    /// Returns the stored key and the value for `key`.
    pub fn get_key_value<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.table.get(self.hash(key), |k| k.borrow() == key)
    }

    /// Returns a mutable reference to the value for `key`.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash(key);
        self.table
            .get_mut(hash, |k| k.borrow() == key)
            .map(|(_, value)| value)
    }

    /// Returns `true` if the map contains `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.find(key).is_valid()
    }

    /// Removes `key`, returning its value.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.remove_entry(key).map(|(_, value)| value)
    }

    /// Removes `key`, returning the stored key and its value.
    pub fn remove_entry<Q>(&mut self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let hash = self.hash(key);
        self.table.remove(hash, |k| k.borrow() == key)
    }

    /// Gets the entry for `key` for in-place manipulation.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_map::HashMap;
    ///
    /// let mut counts: HashMap<char, usize> = HashMap::new();
    /// for c in "abracadabra".chars() {
    ///     *counts.entry(c).or_default() += 1;
    /// }
    ///
    /// assert_eq!(counts[&'a'], 5);
    /// assert_eq!(counts[&'b'], 2);
    /// assert_eq!(counts.len(), 5);
    /// ```
    pub fn entry(&mut self, key: K) -> Entry<'_, K, V> {
        let hash = self.hash(&key);
        match self.table.entry(hash, |k| k == &key) {
            hash_table::Entry::Occupied(entry) => Entry::Occupied(OccupiedEntry { entry }),
            hash_table::Entry::Vacant(entry) => Entry::Vacant(VacantEntry { entry, key }),
        }
    }
}

impl<K, V, S> HashMap<K, V, S>
where
    S: Default,
{
    /// Creates an empty map using the default hasher builder.
    ///
    /// The map starts with three slots and grows on demand.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates an empty map sized for `expected` elements using the default
    /// hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use robin_map::HashMap;
    ///
    /// let map: HashMap<u64, ()> = HashMap::with_capacity(15);
    /// assert_eq!(map.capacity(), 21);
    /// ```
    pub fn with_capacity(expected: usize) -> Self {
        Self::with_capacity_and_hasher(expected, S::default())
    }
}

impl<K, V, S> Default for HashMap<K, V, S>
where
    S: Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> PartialEq for HashMap<K, V, S>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|v| v == value))
    }
}

impl<K, V, S> Eq for HashMap<K, V, S>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
{
}

impl<K, Q, V, S> Index<&Q> for HashMap<K, V, S>
where
    K: Hash + Eq + Borrow<Q>,
    Q: Hash + Eq + ?Sized,
    S: BuildHasher,
{
    type Output = V;

    /// # Panics
    ///
    /// Panics if the key is not present in the map.
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("no entry found for key")
    }
}

impl<K, V, S> FromIterator<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        map.extend(iter);
        map
    }
}

impl<K, V, S> Extend<(K, V)> for HashMap<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        self.reserve(self.len().saturating_add(iter.size_hint().0));
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

impl<K, V, S> IntoIterator for HashMap<K, V, S> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            inner: self.table.into_iter(),
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a HashMap<K, V, S> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, S> IntoIterator for &'a mut HashMap<K, V, S> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

/// A view into a single entry in the map, which may either be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashMap`].
///
/// [`entry`]: HashMap::entry
pub enum Entry<'a, K, V> {
    /// A vacant entry.
    Vacant(VacantEntry<'a, K, V>),
    /// An occupied entry.
    Occupied(OccupiedEntry<'a, K, V>),
}

impl<'a, K, V> Entry<'a, K, V> {
    /// Inserts `default` if the entry is vacant and returns a mutable
    /// reference to the value.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts the value computed by `default` if the entry is vacant.
    pub fn or_insert_with<F>(self, default: F) -> &'a mut V
    where
        F: FnOnce() -> V,
    {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Applies `f` to the value if the entry is occupied.
    pub fn and_modify<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut V),
    {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }

    /// Returns a reference to this entry's key.
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }
}

impl<'a, K, V> Entry<'a, K, V>
where
    V: Default,
{
    /// Inserts `V::default()` if the entry is vacant.
    pub fn or_default(self) -> &'a mut V {
        self.or_insert_with(Default::default)
    }
}

/// A view into a vacant entry in the map.
pub struct VacantEntry<'a, K, V> {
    entry: hash_table::VacantEntry<'a, K, V>,
    key: K,
}

impl<'a, K, V> VacantEntry<'a, K, V> {
    /// Gets a reference to the key that would be used when inserting a value.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Takes ownership of the key.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Inserts the value into the map and returns a mutable reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        self.entry.insert(self.key, value)
    }
}

/// A view into an occupied entry in the map.
pub struct OccupiedEntry<'a, K, V> {
    entry: hash_table::OccupiedEntry<'a, K, V>,
}

impl<'a, K, V> OccupiedEntry<'a, K, V> {
    /// Returns a handle to this entry, valid until the map is next mutated.
    pub fn handle(&self) -> Handle {
        self.entry.handle()
    }

    /// Gets a reference to the key in the entry.
    pub fn key(&self) -> &K {
        self.entry.key()
    }

    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        self.entry.get()
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        self.entry.get_mut()
    }

    /// Converts the entry into a mutable reference to the value.
    pub fn into_mut(self) -> &'a mut V {
        self.entry.into_mut()
    }

    /// Replaces the value and returns the old one.
    pub fn insert(&mut self, value: V) -> V {
        self.entry.insert(value)
    }

    /// Removes the entry from the map and returns the value.
    pub fn remove(self) -> V {
        self.entry.remove().1
    }

    /// Removes the entry from the map and returns the key and value.
    pub fn remove_entry(self) -> (K, V) {
        self.entry.remove()
    }
}

/// An iterator over the entries of a `HashMap`.
pub struct Iter<'a, K, V> {
    inner: hash_table::Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// A mutable iterator over the entries of a `HashMap`.
pub struct IterMut<'a, K, V> {
    inner: hash_table::IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

/// An iterator over the keys of a `HashMap`.
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

/// An iterator over the values of a `HashMap`.
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}

/// A mutable iterator over the values of a `HashMap`.
pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for ValuesMut<'_, K, V> {}

/// An owning iterator over the entries of a `HashMap`.
pub struct IntoIter<K, V> {
    inner: hash_table::IntoIter<K, V>,
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}

/// A draining iterator over the entries of a `HashMap`.
pub struct Drain<'a, K, V> {
    inner: hash_table::Drain<'a, K, V>,
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
