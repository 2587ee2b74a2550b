//! Configuration module for BucketSync
//!
//! Provides the typed sync target model, engine settings, config file
//! loading and CLI arguments.

mod settings;

pub use settings::*;
