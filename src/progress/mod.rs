//! Progress reporting module
//!
//! Provides the listener interface for sync progress and console
//! renderings of it (dot ticks or progress bars).

mod reporter;

pub use reporter::*;
