//! # BucketSync - Directory to S3 Prefix Synchronization
//!
//! BucketSync mirrors local directory trees into S3 bucket prefixes and
//! removes them again on teardown. It only transfers what changed, deletes
//! objects whose local file disappeared, and applies per-file upload
//! parameters chosen by glob rules.
//!
//! ## Features
//!
//! - **Incremental Sync**: ETag/MD5 comparison, size-only for multipart objects
//! - **Remote Cleanup**: Delete objects with no local counterpart, or clear a prefix
//! - **Glob Parameter Rules**: Cache-Control, Content-Type, ACL and metadata per file
//! - **Bounded Concurrency**: At most N transfers in flight, transient failures retried
//! - **Deploy Phases**: Artifact targets first, the rest after the deploy
//!
//! ## Quick Start
//!
//! ```no_run
//! use bucketsync::config::{EngineSettings, SyncTarget};
//! use bucketsync::core::{SchedulerConfig, SyncEngine};
//! use bucketsync::progress::NoProgress;
//! use bucketsync::storage::S3Store;
//! use std::sync::Arc;
//!
//! # async fn run() -> bucketsync::Result<()> {
//! let settings = EngineSettings::default();
//! let store = Arc::new(S3Store::connect(&settings).await);
//! let engine = SyncEngine::new(store, SchedulerConfig::from_settings(&settings));
//!
//! let target = SyncTarget::new("dist", "my-site").with_prefix("app");
//! let summary = engine.sync_directory(&target, &NoProgress).await?;
//!
//! println!("{} uploaded, {} deleted", summary.uploaded, summary.deleted);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing Without a Network
//!
//! ```
//! use bucketsync::storage::{MemoryStore, RemoteLister};
//!
//! # let rt = tokio::runtime::Runtime::new().unwrap();
//! # rt.block_on(async {
//! let store = MemoryStore::new();
//! store.insert("bucket", "app/index.html", b"<html></html>");
//!
//! let listing = RemoteLister::new(&store).list("bucket", "app/").await.unwrap();
//! assert!(listing.get("index.html").is_some());
//! # });
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod fs;
pub mod hash;
pub mod progress;
pub mod storage;
pub mod sync;

// Re-export commonly used types
pub use config::{ConfigFile, EngineSettings, SyncTarget};
pub use core::{SyncEngine, SyncSummary};
pub use error::{Result, SyncError};
pub use progress::ProgressReporter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use bucketsync::prelude::*;
    //! ```

    pub use crate::config::{
        CannedAcl, ConfigFile, EngineSettings, ObjectParams, ParamRule, Phase, SyncTarget,
    };
    pub use crate::core::{ClearSummary, DeployRunner, SchedulerConfig, SyncEngine, SyncSummary};
    pub use crate::error::{Result, StoreError, SyncError};
    pub use crate::progress::{DotTicker, NoProgress, ProgressListener, ProgressReporter};
    pub use crate::storage::{MemoryStore, ObjectStore, S3Store};
    pub use crate::sync::{SyncAction, SyncPlan};
}
