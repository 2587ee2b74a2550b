//! Deploy phase runner
//!
//! Runs the configured targets the way a deploy pipeline expects: targets
//! marked `artifact` go while artifacts are uploaded, the rest after the
//! deploy. Targets within a phase run concurrently and every one of them
//! is awaited, even when a sibling fails.

use crate::config::{Phase, SyncTarget};
use crate::core::{ClearSummary, SyncEngine, SyncSummary};
use crate::error::{Result, SyncError};
use crate::progress::ProgressListener;
use crate::sync::SyncPlan;
use console::style;
use futures::future::join_all;

/// Runs sync and clear over a set of targets
pub struct DeployRunner<'a> {
    engine: &'a SyncEngine,
    targets: &'a [SyncTarget],
    listener: &'a dyn ProgressListener,
    quiet: bool,
}

impl<'a> DeployRunner<'a> {
    /// Create a runner
    pub fn new(
        engine: &'a SyncEngine,
        targets: &'a [SyncTarget],
        listener: &'a dyn ProgressListener,
    ) -> Self {
        Self {
            engine,
            targets,
            listener,
            quiet: false,
        }
    }

    /// Suppress console messages
    pub fn quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    fn say(&self, message: impl std::fmt::Display) {
        if !self.quiet {
            println!("{}{}", style("S3 Sync: ").yellow(), message);
        }
    }

    /// Finish the line of progress dots
    fn end_ticks(&self) {
        if !self.quiet {
            eprintln!();
        }
    }

    fn selected(&self, phase: Phase) -> Vec<&'a SyncTarget> {
        self.targets.iter().filter(|t| phase.includes(t)).collect()
    }

    /// Run `phase`; `Phase::All` runs the artifact targets first
    pub async fn run(&self, phase: Phase) -> Result<Vec<SyncSummary>> {
        match phase {
            Phase::All => {
                let mut summaries = self.sync_phase(Phase::Artifact).await?;
                summaries.extend(self.sync_phase(Phase::Deploy).await?);
                Ok(summaries)
            }
            phase => self.sync_phase(phase).await,
        }
    }

    /// Artifact phase, then deploy phase
    pub async fn sync_all(&self) -> Result<Vec<SyncSummary>> {
        self.run(Phase::All).await
    }

    /// Sync every target selected by `phase` concurrently
    pub async fn sync_phase(&self, phase: Phase) -> Result<Vec<SyncSummary>> {
        let targets = self.selected(phase);
        if targets.is_empty() {
            return Ok(Vec::new());
        }

        self.say("Syncing directories and S3 prefixes...");
        for target in &targets {
            self.say(format!(
                "{} -> {}",
                target.local_directory.display(),
                target.destination()
            ));
        }

        let results = join_all(
            targets
                .iter()
                .map(|target| self.engine.sync_directory(target, self.listener)),
        )
        .await;
        self.end_ticks();
        let summaries = collect(results)?;

        self.say("Synced.");
        Ok(summaries)
    }

    /// Clear the prefix of every target concurrently
    pub async fn clear_all(&self) -> Result<Vec<ClearSummary>> {
        if self.targets.is_empty() {
            return Ok(Vec::new());
        }

        self.say("Removing S3 objects...");
        let results = join_all(
            self.targets
                .iter()
                .map(|target| self.engine.clear_prefix(target, self.listener)),
        )
        .await;
        self.end_ticks();
        let summaries = collect(results)?;

        self.say("Removed.");
        Ok(summaries)
    }

    /// Plans for the targets `phase` would sync
    pub async fn plan(&self, phase: Phase) -> Result<Vec<(String, SyncPlan)>> {
        let mut plans = Vec::new();
        for target in self.selected(phase) {
            let plan = self.engine.plan_sync(target, self.listener).await?;
            plans.push((target.destination(), plan));
        }
        Ok(plans)
    }

    /// Plans for clearing every target
    pub async fn plan_clear(&self) -> Result<Vec<(String, SyncPlan)>> {
        let mut plans = Vec::new();
        for target in self.targets {
            plans.push((target.destination(), self.engine.plan_clear(target).await?));
        }
        Ok(plans)
    }
}

/// Keep every success, fail with the first error in target order
fn collect<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
    let mut values = Vec::with_capacity(results.len());
    let mut first_error: Option<SyncError> = None;
    let mut failed = 0usize;

    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(e) => {
                failed += 1;
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => {
            if failed > 1 {
                tracing::error!("{} targets failed; reporting the first", failed);
            }
            Err(e)
        }
        None => Ok(values),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SchedulerConfig;
    use crate::error::StoreError;
    use crate::progress::NoProgress;
    use crate::storage::MemoryStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn site(files: &[(&str, &[u8])]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (rel, body) in files {
            let path = dir.path().join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }
        dir
    }

    fn engine(store: &Arc<MemoryStore>) -> SyncEngine {
        SyncEngine::new(store.clone(), SchedulerConfig::default())
    }

    #[tokio::test]
    async fn test_phases_select_targets() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);
        let assets = site(&[("app.js", b"js")]);
        let docs = site(&[("index.html", b"<html>")]);
        let targets = vec![
            SyncTarget::new(assets.path(), "b").with_prefix("assets").artifact(true),
            SyncTarget::new(docs.path(), "b").with_prefix("docs"),
        ];
        let runner = DeployRunner::new(&engine, &targets, &NoProgress).quiet(true);

        let artifact = runner.run(Phase::Artifact).await.unwrap();
        assert_eq!(artifact.len(), 1);
        assert_eq!(store.keys("b"), vec!["assets/app.js".to_string()]);

        let all = runner.sync_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(
            store.keys("b"),
            vec!["assets/app.js".to_string(), "docs/index.html".to_string()]
        );
    }

    #[tokio::test]
    async fn test_failure_in_one_target_still_runs_the_rest() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);
        let first = site(&[("a.txt", b"a")]);
        let second = site(&[("b.txt", b"b")]);
        store.fail_key("one/a.txt", StoreError::other("rejected"));
        let targets = vec![
            SyncTarget::new(first.path(), "b").with_prefix("one"),
            SyncTarget::new(second.path(), "b").with_prefix("two"),
        ];
        let runner = DeployRunner::new(&engine, &targets, &NoProgress).quiet(true);

        let err = runner.run(Phase::Deploy).await.unwrap_err();
        assert!(matches!(err, SyncError::TransferFailed { .. }));
        assert!(store.object("b", "two/b.txt").is_some());
    }

    #[tokio::test]
    async fn test_clear_all() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);
        store.insert("b", "one/a", b"x");
        store.insert("b", "two/b", b"x");
        store.insert("b", "three/c", b"x");
        let dir = TempDir::new().unwrap();
        let targets = vec![
            SyncTarget::new(dir.path(), "b").with_prefix("one"),
            SyncTarget::new(dir.path(), "b").with_prefix("two"),
        ];
        let runner = DeployRunner::new(&engine, &targets, &NoProgress).quiet(true);

        let summaries = runner.clear_all().await.unwrap();
        assert_eq!(summaries.iter().map(|s| s.deleted).sum::<u64>(), 2);
        assert_eq!(store.keys("b"), vec!["three/c".to_string()]);
    }

    #[tokio::test]
    async fn test_dry_run_plans_only() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);
        let dir = site(&[("a.txt", b"a")]);
        store.insert("b", "app/stale.txt", b"x");
        let targets = vec![SyncTarget::new(dir.path(), "b").with_prefix("app")];
        let runner = DeployRunner::new(&engine, &targets, &NoProgress).quiet(true);

        let plans = runner.plan(Phase::All).await.unwrap();
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].0, "s3://b/app/");
        assert_eq!(plans[0].1.uploads(), 1);
        assert_eq!(plans[0].1.deletes(), 1);

        let clears = runner.plan_clear().await.unwrap();
        assert_eq!(clears[0].1.deletes(), 1);
        assert_eq!(store.put_calls() + store.delete_calls(), 0);
    }

    #[test]
    fn test_collect_reports_first_error() {
        let results: Vec<Result<u32>> = vec![
            Ok(1),
            Err(SyncError::config("first")),
            Err(SyncError::config("second")),
        ];
        match collect(results) {
            Err(SyncError::ConfigInvalid(msg)) => assert_eq!(msg, "first"),
            other => panic!("unexpected: {:?}", other.map(|v| v.len())),
        }
    }
}
