//! Errors reported by the fallible allocation paths.

use core::fmt;

/// The error returned by [`HashTable::try_reserve`] and
/// [`HashMap::try_reserve`].
///
/// Either variant leaves the table exactly as it was: new storage is
/// allocated before any entry is moved.
///
/// [`HashTable::try_reserve`]: crate::HashTable::try_reserve
/// [`HashMap::try_reserve`]: crate::HashMap::try_reserve
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TryReserveError {
    /// The requested slot count does not fit in the address space.
    CapacityOverflow,
    /// The allocator refused a request for `capacity` slots.
    AllocError {
        /// Number of slots that were requested.
        capacity: usize,
    },
}

impl fmt::Display for TryReserveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryReserveError::CapacityOverflow => {
                f.write_str("requested table capacity exceeds the maximum allocation size")
            }
            TryReserveError::AllocError { capacity } => {
                write!(f, "memory allocation failed for a table of {capacity} slots")
            }
        }
    }
}

impl core::error::Error for TryReserveError {}
