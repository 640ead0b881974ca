#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

cfg_if::cfg_if! {
    if #[cfg(feature = "tracing")] {
        macro_rules! log_event {
            ($($arg:tt)*) => {
                tracing::debug!($($arg)*)
            };
        }
    } else {
        macro_rules! log_event {
            ($($arg:tt)*) => {};
        }
    }
}

pub mod error;
mod handle;

/// A key-value map over the Robin Hood table.
///
/// This module provides a `HashMap` that wraps the `HashTable` with a
/// configurable `BuildHasher` and the usual map interface.
pub mod hash_map;

pub mod hash_table;

pub use error::TryReserveError;
pub use handle::Handle;
pub use hash_map::Entry;
pub use hash_map::HashMap;
pub use hash_table::HashTable;
pub use hash_table::capacity_for;

cfg_if::cfg_if! {
    if #[cfg(feature = "foldhash")] {
        /// The hasher builder used by [`HashMap`] when none is given.
        pub type DefaultHashBuilder = foldhash::fast::RandomState;
    } else if #[cfg(feature = "std")] {
        /// The hasher builder used by [`HashMap`] when none is given.
        pub type DefaultHashBuilder = std::hash::RandomState;
    } else {
        /// Placeholder hasher builder when neither `foldhash` nor `std` is
        /// enabled. It cannot be constructed, so a `HashMap` in that
        /// configuration needs an explicit hasher.
        pub enum DefaultHashBuilder {}
    }
}
