//! Sync orchestration
//!
//! Drives one target through its phases:
//! Enumerating → Listing → Planning → Transferring → Completed | Failed.
//! Operations against the same bucket and prefix are mutually exclusive.

use crate::config::SyncTarget;
use crate::core::{SchedulerConfig, TransferReport, TransferScheduler};
use crate::error::{Result, SyncError};
use crate::fs::FileEnumerator;
use crate::hash::md5_file;
use crate::progress::{EventKind, ProgressEvent, ProgressListener};
use crate::storage::{ObjectStore, RemoteLister, RemoteListing};
use crate::sync::{DiffPlanner, ParamResolver, SyncPlan};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

/// Lifecycle of one sync or clear operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    /// Not started
    Idle,
    /// Walking the local directory
    Enumerating,
    /// Listing the remote prefix
    Listing,
    /// Diffing local against remote
    Planning,
    /// Running uploads and deletes
    Transferring,
    /// Every unit succeeded
    Completed,
    /// Aborted or finished with failures
    Failed,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Enumerating => "enumerating",
            Self::Listing => "listing",
            Self::Planning => "planning",
            Self::Transferring => "transferring",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Result of a successful sync
#[derive(Debug, Clone)]
pub struct SyncSummary {
    /// Destination (`s3://bucket/prefix`)
    pub target: String,
    /// Files uploaded
    pub uploaded: u64,
    /// Remote objects deleted
    pub deleted: u64,
    /// Files left alone
    pub skipped: u64,
    /// Transfer details
    pub report: TransferReport,
}

/// Result of a successful clear
#[derive(Debug, Clone)]
pub struct ClearSummary {
    /// Destination (`s3://bucket/prefix`)
    pub target: String,
    /// Objects deleted
    pub deleted: u64,
    /// Transfer details
    pub report: TransferReport,
}

/// Held while an operation runs against a prefix
struct TargetLock {
    active: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        active.remove(&self.key);
    }
}

/// Entry point for syncing directories to and clearing bucket prefixes
pub struct SyncEngine {
    store: Arc<dyn ObjectStore>,
    scheduler: TransferScheduler,
    active: Arc<Mutex<HashSet<String>>>,
}

impl SyncEngine {
    /// Create an engine over `store`
    pub fn new(store: Arc<dyn ObjectStore>, config: SchedulerConfig) -> Self {
        Self {
            store,
            scheduler: TransferScheduler::new(config),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Scheduler configuration
    pub fn config(&self) -> &SchedulerConfig {
        self.scheduler.config()
    }

    fn lock_target(&self, target: &SyncTarget) -> Result<TargetLock> {
        let key = target.lock_key();
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if !active.insert(key.clone()) {
            return Err(SyncError::TargetBusy {
                bucket: target.bucket_name.clone(),
                prefix: target.key_prefix(),
            });
        }
        Ok(TargetLock {
            active: Arc::clone(&self.active),
            key,
        })
    }

    fn enter(&self, listener: &dyn ProgressListener, destination: &str, phase: SyncPhase) {
        tracing::debug!("{}: {}", destination, phase);
        listener.on_event(&ProgressEvent {
            target: destination.to_string(),
            kind: EventKind::Phase(phase),
        });
    }

    /// Mirror `target.local_directory` into its bucket prefix
    pub async fn sync_directory(
        &self,
        target: &SyncTarget,
        listener: &dyn ProgressListener,
    ) -> Result<SyncSummary> {
        target.validate()?;
        let resolver = ParamResolver::new(&target.param_rules)?;
        let _lock = self.lock_target(target)?;
        let destination = target.destination();

        let result = self.run_sync(target, resolver, listener, &destination).await;
        self.finish(listener, &destination, &result);
        result
    }

    async fn run_sync(
        &self,
        target: &SyncTarget,
        resolver: ParamResolver,
        listener: &dyn ProgressListener,
        destination: &str,
    ) -> Result<SyncSummary> {
        let plan = self.build_plan(target, resolver, listener, destination).await?;
        let uploaded = plan.uploads() as u64;
        let deleted = plan.deletes() as u64;

        self.enter(listener, destination, SyncPhase::Transferring);
        let report = self
            .scheduler
            .execute(
                Arc::clone(&self.store),
                &target.bucket_name,
                plan.into_actions(),
                destination,
                listener,
            )
            .await;
        let report = settle(report)?;

        Ok(SyncSummary {
            target: destination.to_string(),
            uploaded,
            deleted,
            skipped: report.skipped,
            report,
        })
    }

    async fn build_plan(
        &self,
        target: &SyncTarget,
        resolver: ParamResolver,
        listener: &dyn ProgressListener,
        destination: &str,
    ) -> Result<SyncPlan> {
        self.enter(listener, destination, SyncPhase::Enumerating);
        let root = target.local_directory.clone();
        let follow = target.follow_symlinks;
        let files = tokio::task::spawn_blocking(move || FileEnumerator::new(root, follow).collect())
            .await
            .map_err(|e| SyncError::Enumeration {
                path: target.local_directory.clone(),
                source: std::io::Error::other(e),
            })??;
        tracing::debug!("{}: {} local file(s)", destination, files.len());

        self.enter(listener, destination, SyncPhase::Listing);
        let remote = self.list(target).await?;

        self.enter(listener, destination, SyncPhase::Planning);
        let planner_target = target.clone();
        tokio::task::spawn_blocking(move || {
            DiffPlanner::for_target(&planner_target, &resolver)
                .plan(&files, &remote, |file| md5_file(&file.absolute_path))
        })
        .await
        .map_err(|e| SyncError::Enumeration {
            path: target.local_directory.clone(),
            source: std::io::Error::other(e),
        })?
    }

    /// Remove every object under the target's prefix
    pub async fn clear_prefix(
        &self,
        target: &SyncTarget,
        listener: &dyn ProgressListener,
    ) -> Result<ClearSummary> {
        target.validate()?;
        let _lock = self.lock_target(target)?;
        let destination = target.destination();
        if target.key_prefix().is_empty() {
            tracing::warn!(
                "Clearing {} with an empty prefix removes every object in the bucket",
                destination
            );
        }

        let result = self.run_clear(target, listener, &destination).await;
        self.finish(listener, &destination, &result);
        result
    }

    async fn run_clear(
        &self,
        target: &SyncTarget,
        listener: &dyn ProgressListener,
        destination: &str,
    ) -> Result<ClearSummary> {
        self.enter(listener, destination, SyncPhase::Listing);
        let remote = self.list(target).await?;
        let plan = crate::sync::plan_clear(remote);

        self.enter(listener, destination, SyncPhase::Transferring);
        let report = self
            .scheduler
            .execute(
                Arc::clone(&self.store),
                &target.bucket_name,
                plan.into_actions(),
                destination,
                listener,
            )
            .await;
        let report = settle(report)?;

        Ok(ClearSummary {
            target: destination.to_string(),
            deleted: report.succeeded,
            report,
        })
    }

    /// Compute what a sync would do without transferring anything
    pub async fn plan_sync(
        &self,
        target: &SyncTarget,
        listener: &dyn ProgressListener,
    ) -> Result<SyncPlan> {
        target.validate()?;
        let resolver = ParamResolver::new(&target.param_rules)?;
        let _lock = self.lock_target(target)?;
        self.build_plan(target, resolver, listener, &target.destination())
            .await
    }

    /// Compute what a clear would delete without deleting anything
    pub async fn plan_clear(&self, target: &SyncTarget) -> Result<SyncPlan> {
        target.validate()?;
        let _lock = self.lock_target(target)?;
        Ok(crate::sync::plan_clear(self.list(target).await?))
    }

    async fn list(&self, target: &SyncTarget) -> Result<RemoteListing> {
        RemoteLister::new(self.store.as_ref())
            .list(&target.bucket_name, &target.key_prefix())
            .await
    }

    fn finish<T>(&self, listener: &dyn ProgressListener, destination: &str, result: &Result<T>) {
        match result {
            Ok(_) => self.enter(listener, destination, SyncPhase::Completed),
            Err(e) => {
                tracing::error!("{}: {}", destination, e);
                self.enter(listener, destination, SyncPhase::Failed)
            }
        }
    }
}

/// Map a transfer report onto the operation result
fn settle(report: TransferReport) -> Result<TransferReport> {
    if report.is_success() {
        return Ok(report);
    }
    if report.succeeded > 0 {
        return Err(SyncError::PartialFailure {
            succeeded: report.succeeded,
            failed: report.failed,
            not_started: report.not_started,
        });
    }
    match report.failures.into_iter().next() {
        Some(first) => Err(SyncError::TransferFailed {
            key: first.key,
            cause: first.error,
        }),
        None => Err(SyncError::PartialFailure {
            succeeded: 0,
            failed: report.failed,
            not_started: report.not_started,
        }),
    }
}
