//! Bounded transfer scheduling
//!
//! Runs planned uploads and deletes against an object store with at most
//! `concurrency` calls in flight. The scheduling loop is the only owner of
//! the progress counters; workers report back through their join handles.
//!
//! Failure handling:
//! - Transient errors (network, throttling) are retried with backoff
//! - Other unit failures are recorded and siblings keep running
//! - Fatal errors (access denied, missing bucket) stop further dispatch

use crate::config::EngineSettings;
use crate::error::StoreError;
use crate::progress::{EventKind, ProgressEvent, ProgressListener};
use crate::storage::{ObjectStore, PutRequest};
use crate::sync::SyncAction;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

/// Maximum retry delay cap
const MAX_RETRY_DELAY: Duration = Duration::from_secs(64);

/// Scheduler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum units in flight
    pub concurrency: usize,
    /// Retries per unit for transient failures
    pub max_retries: u32,
    /// Delay before the first retry; doubles afterwards
    pub retry_base_delay: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: crate::config::DEFAULT_CONCURRENCY,
            max_retries: crate::config::DEFAULT_MAX_RETRIES,
            retry_base_delay: Duration::from_millis(200),
        }
    }
}

impl SchedulerConfig {
    /// Build from engine settings
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            concurrency: settings.concurrency.max(1),
            max_retries: settings.max_retries,
            retry_base_delay: settings.retry_base_delay(),
        }
    }
}

/// Running counters for one transfer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressState {
    /// Weight of units completed successfully
    pub amount_transferred: u64,
    /// Sum of all unit weights
    pub total_expected: u64,
    /// Units that succeeded
    pub completed_count: u64,
    /// Units that failed
    pub failed_count: u64,
}

impl ProgressState {
    /// Completion rounded to the nearest 10%, or `None` when there is
    /// nothing to measure against
    pub fn percent_bucket(&self) -> Option<u8> {
        if self.total_expected == 0 {
            return None;
        }
        let ratio = self.amount_transferred as f64 / self.total_expected as f64;
        Some(((ratio * 10.0).round() as u8).min(10) * 10)
    }
}

/// A unit that ended in failure
#[derive(Debug, Clone, PartialEq)]
pub struct TransferFailure {
    /// Object key
    pub key: String,
    /// Last error seen
    pub error: StoreError,
}

/// Outcome of a transfer run
#[derive(Debug, Clone, Default)]
pub struct TransferReport {
    /// Units that succeeded
    pub succeeded: u64,
    /// Units that failed
    pub failed: u64,
    /// Identical files that needed no transfer
    pub skipped: u64,
    /// Units never dispatched because a fatal error halted the run
    pub not_started: u64,
    /// Weight of successful units
    pub bytes_transferred: u64,
    /// Failures in completion order
    pub failures: Vec<TransferFailure>,
    /// Wall time
    pub elapsed: Duration,
}

impl TransferReport {
    /// True when every dispatched unit succeeded and none were left behind
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.not_started == 0
    }

    /// First failure recorded
    pub fn first_failure(&self) -> Option<&TransferFailure> {
        self.failures.first()
    }

    /// Print a summary
    pub fn print_summary(&self) {
        println!("\n=== Transfer Summary ===");
        println!("Succeeded:       {}", self.succeeded);
        println!("Skipped:         {}", self.skipped);
        println!(
            "Transferred:     {}",
            humansize::format_size(self.bytes_transferred, humansize::BINARY)
        );
        println!(
            "Duration:        {}",
            humantime::format_duration(Duration::from_millis(self.elapsed.as_millis() as u64))
        );

        if self.failed > 0 || self.not_started > 0 {
            println!("\nFailed: {}  Not started: {}", self.failed, self.not_started);
            for failure in &self.failures {
                println!("  {} - {}", failure.key, failure.error);
            }
        }
    }
}

/// Result of one unit, returned from its worker
#[derive(Debug)]
struct UnitOutcome {
    key: String,
    weight: u64,
    result: Result<(), StoreError>,
}

/// Dispatches transfer units with bounded concurrency
#[derive(Debug, Clone, Default)]
pub struct TransferScheduler {
    config: SchedulerConfig,
}

impl TransferScheduler {
    /// Create a scheduler
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    /// Configuration in use
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Run every transfer action to a terminal state
    ///
    /// Skip actions are counted but never dispatched. The returned report
    /// always accounts for every action exactly once.
    pub async fn execute(
        &self,
        store: Arc<dyn ObjectStore>,
        bucket: &str,
        actions: Vec<SyncAction>,
        target: &str,
        listener: &dyn ProgressListener,
    ) -> TransferReport {
        let started = Instant::now();
        let mut report = TransferReport::default();

        let mut queue: VecDeque<SyncAction> = VecDeque::with_capacity(actions.len());
        for action in actions {
            if action.is_transfer() {
                queue.push_back(action);
            } else {
                report.skipped += 1;
            }
        }

        let mut state = ProgressState {
            total_expected: queue.iter().map(SyncAction::weight).sum(),
            ..Default::default()
        };
        let emit = |kind: EventKind| {
            listener.on_event(&ProgressEvent {
                target: target.to_string(),
                kind,
            })
        };
        emit(EventKind::Started {
            units: queue.len(),
            total_bytes: state.total_expected,
        });

        let concurrency = self.config.concurrency.max(1);
        let mut tasks: JoinSet<UnitOutcome> = JoinSet::new();
        let mut last_bucket = 0u8;
        let mut halted = false;

        loop {
            while !halted && tasks.len() < concurrency {
                let Some(action) = queue.pop_front() else {
                    break;
                };
                let store = Arc::clone(&store);
                let bucket = bucket.to_string();
                let config = self.config;
                tasks.spawn(async move { run_unit(store.as_ref(), &bucket, action, &config).await });
            }

            let Some(joined) = tasks.join_next().await else {
                break;
            };

            let outcome = joined.unwrap_or_else(|e| UnitOutcome {
                key: "<unknown>".to_string(),
                weight: 0,
                result: Err(StoreError::other(format!("transfer task aborted: {}", e))),
            });

            match &outcome.result {
                Ok(()) => {
                    report.succeeded += 1;
                    report.bytes_transferred += outcome.weight;
                    state.completed_count += 1;
                    state.amount_transferred += outcome.weight;
                }
                Err(error) => {
                    report.failed += 1;
                    state.failed_count += 1;
                    if error.is_fatal() && !halted {
                        tracing::warn!(
                            "Fatal error on {}, halting dispatch with {} units queued: {}",
                            outcome.key,
                            queue.len(),
                            error
                        );
                        halted = true;
                    } else {
                        tracing::warn!("Transfer of {} failed: {}", outcome.key, error);
                    }
                    report.failures.push(TransferFailure {
                        key: outcome.key.clone(),
                        error: error.clone(),
                    });
                }
            }

            emit(EventKind::Unit {
                key: outcome.key,
                error: outcome.result.err(),
            });

            if let Some(percent) = state.percent_bucket() {
                if percent > last_bucket {
                    last_bucket = percent;
                    emit(EventKind::Tick { percent, state });
                }
            }
        }

        report.not_started = queue.len() as u64;
        report.elapsed = started.elapsed();

        tracing::debug!(
            "{}: {} succeeded, {} failed, {} skipped, {} not started",
            target,
            report.succeeded,
            report.failed,
            report.skipped,
            report.not_started
        );

        emit(EventKind::Finished(report.clone()));
        report
    }
}

/// Perform one unit, retrying transient failures
async fn run_unit(
    store: &dyn ObjectStore,
    bucket: &str,
    action: SyncAction,
    config: &SchedulerConfig,
) -> UnitOutcome {
    let weight = action.weight();
    let key = action.key().unwrap_or_default().to_string();

    let mut retries = 0;
    let result = loop {
        let attempt = match &action {
            SyncAction::Upload { file, key, params } => {
                let request = PutRequest {
                    bucket: bucket.to_string(),
                    key: key.clone(),
                    local_path: file.absolute_path.clone(),
                    size: file.size,
                    params: params.clone(),
                };
                store.put_object(&request).await.map(|_| ())
            }
            SyncAction::Delete { key, .. } => store.delete_object(bucket, key).await,
            SyncAction::Skip { .. } => Ok(()),
        };

        match attempt {
            Err(e) if e.is_retryable() && retries < config.max_retries => {
                retries += 1;
                let delay = exponential_backoff_delay(config.retry_base_delay, retries);
                tracing::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    key,
                    retries,
                    config.max_retries,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            other => break other,
        }
    };

    UnitOutcome {
        key,
        weight,
        result,
    }
}

/// Backoff before retry number `retries` (1-based): base, 2x base, 4x base...
fn exponential_backoff_delay(base: Duration, retries: u32) -> Duration {
    let factor = 1u32 << retries.saturating_sub(1).min(16);
    base.saturating_mul(factor).min(MAX_RETRY_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreErrorKind;
    use crate::progress::NoProgress;
    use crate::storage::MemoryStore;
    use std::sync::Mutex;

    const BUCKET: &str = "bucket";

    fn deletes(store: &MemoryStore, count: usize, size: u64) -> Vec<SyncAction> {
        (0..count)
            .map(|i| {
                let key = format!("app/k{:04}", i);
                store.insert(BUCKET, &key, b"x");
                SyncAction::Delete { key, size }
            })
            .collect()
    }

    fn fast(concurrency: usize) -> TransferScheduler {
        TransferScheduler::new(SchedulerConfig {
            concurrency,
            max_retries: 2,
            retry_base_delay: Duration::from_millis(1),
        })
    }

    #[test]
    fn test_percent_bucket() {
        let mut state = ProgressState::default();
        assert_eq!(state.percent_bucket(), None);

        state.total_expected = 1000;
        state.amount_transferred = 44;
        assert_eq!(state.percent_bucket(), Some(0));
        state.amount_transferred = 55;
        assert_eq!(state.percent_bucket(), Some(10));
        state.amount_transferred = 1000;
        assert_eq!(state.percent_bucket(), Some(100));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let base = Duration::from_millis(200);
        assert_eq!(exponential_backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(exponential_backoff_delay(base, 2), Duration::from_millis(400));
        assert_eq!(exponential_backoff_delay(base, 3), Duration::from_millis(800));
        assert_eq!(exponential_backoff_delay(base, 30), MAX_RETRY_DELAY);
    }

    #[tokio::test]
    async fn test_concurrency_bound() {
        let store = Arc::new(MemoryStore::new().with_latency(Duration::from_millis(1)));
        let actions = deletes(&store, 2500, 1);

        let report = fast(5)
            .execute(store.clone(), BUCKET, actions, "t", &NoProgress)
            .await;

        assert_eq!(report.succeeded, 2500);
        assert!(report.is_success());
        assert_eq!(store.max_in_flight(), 5);
        assert!(store.keys(BUCKET).is_empty());
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_siblings_running() {
        let store = Arc::new(MemoryStore::new());
        let actions = deletes(&store, 5, 1);
        store.fail_key("app/k0003", StoreError::other("boom"));

        let report = fast(2)
            .execute(store.clone(), BUCKET, actions, "t", &NoProgress)
            .await;

        assert_eq!(report.succeeded, 4);
        assert_eq!(report.failed, 1);
        assert_eq!(report.not_started, 0);
        assert_eq!(report.first_failure().unwrap().key, "app/k0003");
        assert_eq!(store.keys(BUCKET), vec!["app/k0003".to_string()]);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let store = Arc::new(MemoryStore::new());
        let actions = deletes(&store, 1, 1);
        store.fail_key_times("app/k0000", StoreError::network("reset"), 2);

        let report = fast(1)
            .execute(store.clone(), BUCKET, actions, "t", &NoProgress)
            .await;

        assert!(report.is_success());
        assert_eq!(store.delete_calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let store = Arc::new(MemoryStore::new());
        let actions = deletes(&store, 1, 1);
        store.fail_key("app/k0000", StoreError::new(StoreErrorKind::Throttled, "slow down"));

        let report = fast(1)
            .execute(store.clone(), BUCKET, actions, "t", &NoProgress)
            .await;

        assert_eq!(report.failed, 1);
        assert_eq!(store.delete_calls(), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_halts_dispatch() {
        let store = Arc::new(MemoryStore::new());
        let actions = deletes(&store, 10, 1);
        store.fail_key(
            "app/k0002",
            StoreError::new(StoreErrorKind::AccessDenied, "denied"),
        );

        let report = fast(1)
            .execute(store.clone(), BUCKET, actions, "t", &NoProgress)
            .await;

        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.not_started, 7);
        assert!(!report.is_success());
        assert_eq!(report.succeeded + report.failed + report.not_started, 10);
    }

    #[tokio::test]
    async fn test_skips_are_counted_not_dispatched() {
        let store = Arc::new(MemoryStore::new());
        let actions = vec![
            SyncAction::Skip {
                relative_path: "a.txt".into(),
            },
            SyncAction::Skip {
                relative_path: "b.txt".into(),
            },
        ];

        let report = fast(5)
            .execute(store.clone(), BUCKET, actions, "t", &NoProgress)
            .await;

        assert_eq!(report.skipped, 2);
        assert_eq!(report.succeeded, 0);
        assert!(report.is_success());
        assert_eq!(store.put_calls() + store.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_ticks_are_monotonic_and_reach_100() {
        let store = Arc::new(MemoryStore::new());
        let actions = deletes(&store, 10, 10);
        let ticks = Mutex::new(Vec::new());
        let finished = Mutex::new(0);
        let listener = |event: &ProgressEvent| match &event.kind {
            EventKind::Tick { percent, .. } => ticks.lock().unwrap().push(*percent),
            EventKind::Finished(_) => *finished.lock().unwrap() += 1,
            _ => {}
        };

        fast(3)
            .execute(store.clone(), BUCKET, actions, "t", &listener)
            .await;

        let ticks = ticks.into_inner().unwrap();
        assert!(ticks.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(ticks.last(), Some(&100));
        assert_eq!(finished.into_inner().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_no_ticks_without_weight() {
        let store = Arc::new(MemoryStore::new());
        let actions = deletes(&store, 3, 0);
        let ticks = Mutex::new(0);
        let listener = |event: &ProgressEvent| {
            if let EventKind::Tick { .. } = event.kind {
                *ticks.lock().unwrap() += 1;
            }
        };

        let report = fast(3)
            .execute(store.clone(), BUCKET, actions, "t", &listener)
            .await;

        assert_eq!(report.succeeded, 3);
        assert_eq!(ticks.into_inner().unwrap(), 0);
    }
}
