//! File system module
//!
//! Provides lazy, fail-fast enumeration of the local tree being synced.

mod enumerator;

pub use enumerator::*;
