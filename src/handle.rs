use core::num::NonZeroUsize;
use core::sync::atomic::AtomicUsize;
use core::sync::atomic::Ordering;

static NEXT_TABLE_ID: AtomicUsize = AtomicUsize::new(1);

/// Identity of a single table allocation, used to reject handles minted by a
/// different table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct TableId(NonZeroUsize);

impl TableId {
    pub(crate) fn next() -> Self {
        let id = NEXT_TABLE_ID.fetch_add(1, Ordering::Relaxed);
        // Wrapping past usize::MAX table constructions would hand out 0.
        TableId(NonZeroUsize::new(id).unwrap_or(NonZeroUsize::MIN))
    }
}

/// A transient reference to one slot of a [`HashTable`] or [`HashMap`].
///
/// Handles are returned by lookups such as [`HashMap::find`] and
/// [`HashMap::first`]. A handle is only meaningful for the table that
/// produced it, and only until the next mutation of that table: any insert,
/// removal, resize or clear makes every outstanding handle stale. Stale
/// handles and handles from other tables are detected and resolve to
/// `None`; they never alias whatever entry now occupies the slot.
///
/// A failed lookup returns [`Handle::INVALID`], which refers to no table at
/// all.
///
/// # Examples
///
/// ```rust
/// # #[cfg(any(feature = "std", feature = "foldhash"))]
/// # {
/// use robin_map::HashMap;
///
/// let mut map: HashMap<&str, i32> = HashMap::new();
/// map.insert("a", 1);
///
/// let handle = map.find("a");
/// assert!(handle.is_valid());
/// assert_eq!(map.value(handle), Some(&1));
///
/// map.insert("b", 2);
/// // Any mutation invalidates earlier handles.
/// assert_eq!(map.value(handle), None);
///
/// assert!(!map.find("missing").is_valid());
/// # }
/// ```
///
/// [`HashTable`]: crate::HashTable
/// [`HashMap`]: crate::HashMap
/// [`HashMap::find`]: crate::HashMap::find
/// [`HashMap::first`]: crate::HashMap::first
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    table: Option<TableId>,
    generation: u64,
    slot: usize,
}

impl Handle {
    /// The handle returned by lookups that found nothing.
    pub const INVALID: Handle = Handle {
        table: None,
        generation: 0,
        slot: 0,
    };

    pub(crate) fn new(table: TableId, generation: u64, slot: usize) -> Self {
        Handle {
            table: Some(table),
            generation,
            slot,
        }
    }

    /// Returns `true` if this handle was produced by a successful lookup.
    ///
    /// A valid handle may still be stale; only the table can tell, which is
    /// why the accessors on the table return `Option`.
    pub fn is_valid(&self) -> bool {
        self.table.is_some()
    }

    /// The slot index this handle refers to, or `None` for
    /// [`Handle::INVALID`].
    pub fn slot(&self) -> Option<usize> {
        self.table.map(|_| self.slot)
    }

    /// Checks the handle against a table's identity and generation, returning
    /// the slot index if it was minted by that table since its last
    /// mutation.
    #[inline]
    pub(crate) fn slot_for(&self, table: TableId, generation: u64) -> Option<usize> {
        if self.table == Some(table) && self.generation == generation {
            Some(self.slot)
        } else {
            None
        }
    }
}

impl Default for Handle {
    fn default() -> Self {
        Handle::INVALID
    }
}
