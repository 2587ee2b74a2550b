//! Core sync engine module
//!
//! Provides the per-target orchestration, the bounded transfer scheduler,
//! and the deploy phase runner that drives them over configured targets.

mod deploy;
mod engine;
mod scheduler;

pub use deploy::*;
pub use engine::*;
pub use scheduler::*;
