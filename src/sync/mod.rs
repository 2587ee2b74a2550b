//! Sync planning module
//!
//! Provides:
//! - Glob-based per-object upload parameters
//! - Diffing of a local tree against a remote listing
//! - Clear plans for removing a whole prefix

mod params;
mod planner;

pub use params::*;
pub use planner::*;
