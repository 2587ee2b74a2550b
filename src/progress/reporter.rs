//! Progress events and listeners
//!
//! The transfer scheduler emits discrete events: phase changes, per-unit
//! completions, coarse ticks every time another 10% of the expected bytes
//! is done, and one terminal event. Listeners decide how to render them:
//! - [`DotTicker`] prints a dot per tick, like a deploy log
//! - [`ProgressReporter`] draws indicatif bars, one per target

use crate::core::{ProgressState, SyncPhase, TransferReport};
use crate::error::StoreError;
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// What happened
#[derive(Debug, Clone)]
pub enum EventKind {
    /// Operation moved to a new phase
    Phase(SyncPhase),
    /// Transfer started with this many units and expected bytes
    Started {
        /// Units queued for dispatch
        units: usize,
        /// Sum of unit weights
        total_bytes: u64,
    },
    /// One unit reached a terminal state
    Unit {
        /// Object key
        key: String,
        /// `None` on success
        error: Option<StoreError>,
    },
    /// Another 10% bucket was crossed
    Tick {
        /// Completion percentage, a multiple of 10
        percent: u8,
        /// Counters at the time of the tick
        state: ProgressState,
    },
    /// All units settled
    Finished(TransferReport),
}

/// A progress notification for one target
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    /// Destination the event belongs to (`s3://bucket/prefix`)
    pub target: String,
    /// Event payload
    pub kind: EventKind,
}

/// Receives progress notifications
pub trait ProgressListener: Send + Sync {
    /// Handle one event
    fn on_event(&self, event: &ProgressEvent);
}

impl<F> ProgressListener for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Listener that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressListener for NoProgress {
    fn on_event(&self, _event: &ProgressEvent) {}
}

/// Prints one dot to stderr per progress tick
#[derive(Debug, Default)]
pub struct DotTicker {
    dots: AtomicU64,
}

impl DotTicker {
    /// Create a ticker
    pub fn new() -> Self {
        Self::default()
    }

    /// Dots printed so far
    pub fn dots(&self) -> u64 {
        self.dots.load(Ordering::Relaxed)
    }
}

impl ProgressListener for DotTicker {
    fn on_event(&self, event: &ProgressEvent) {
        if let EventKind::Tick { .. } = event.kind {
            self.dots.fetch_add(1, Ordering::Relaxed);
            let mut stderr = std::io::stderr().lock();
            let _ = write!(stderr, ".");
            let _ = stderr.flush();
        }
    }
}

/// Progress bars for concurrent targets
pub struct ProgressReporter {
    /// Multi-progress container
    multi: MultiProgress,
    /// One byte bar per target
    bars: Mutex<HashMap<String, ProgressBar>>,
    /// Bar style
    style: ProgressStyle,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.green/white}] {bytes}/{total_bytes} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
            style,
        }
    }

    /// Create a reporter that draws nothing (for quiet mode)
    pub fn hidden() -> Self {
        let reporter = Self::new();
        reporter.multi.set_draw_target(ProgressDrawTarget::hidden());
        reporter
    }

    fn with_bar(&self, target: &str, f: impl FnOnce(&ProgressBar)) {
        let mut bars = self.bars.lock().unwrap_or_else(|p| p.into_inner());
        let bar = bars.entry(target.to_string()).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new(0));
            bar.set_style(self.style.clone());
            bar.set_prefix(target.to_string());
            bar
        });
        f(bar);
    }

    /// Bytes shown for a target so far
    pub fn position(&self, target: &str) -> Option<u64> {
        let bars = self.bars.lock().unwrap_or_else(|p| p.into_inner());
        bars.get(target).map(|bar| bar.position())
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressListener for ProgressReporter {
    fn on_event(&self, event: &ProgressEvent) {
        match &event.kind {
            EventKind::Phase(phase) => {
                self.with_bar(&event.target, |bar| bar.set_message(phase.to_string()))
            }
            EventKind::Started { total_bytes, .. } => {
                self.with_bar(&event.target, |bar| bar.set_length(*total_bytes))
            }
            EventKind::Tick { state, .. } => {
                self.with_bar(&event.target, |bar| bar.set_position(state.amount_transferred))
            }
            EventKind::Unit { .. } => {}
            EventKind::Finished(report) => self.with_bar(&event.target, |bar| {
                bar.set_position(report.bytes_transferred);
                if report.is_success() {
                    bar.finish_with_message("✓ done");
                } else {
                    bar.abandon_with_message(format!("✗ {} failed", report.failed));
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind) -> ProgressEvent {
        ProgressEvent {
            target: "s3://b/app/".to_string(),
            kind,
        }
    }

    #[test]
    fn test_closure_listener() {
        let seen = Mutex::new(Vec::new());
        let listener = |e: &ProgressEvent| seen.lock().unwrap().push(e.target.clone());
        listener.on_event(&event(EventKind::Phase(SyncPhase::Listing)));
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_dot_ticker_counts_ticks_only() {
        let ticker = DotTicker::new();
        ticker.on_event(&event(EventKind::Phase(SyncPhase::Transferring)));
        ticker.on_event(&event(EventKind::Tick {
            percent: 10,
            state: ProgressState::default(),
        }));
        ticker.on_event(&event(EventKind::Tick {
            percent: 20,
            state: ProgressState::default(),
        }));
        assert_eq!(ticker.dots(), 2);
    }

    #[test]
    fn test_reporter_tracks_position() {
        let reporter = ProgressReporter::hidden();
        reporter.on_event(&event(EventKind::Started {
            units: 2,
            total_bytes: 100,
        }));
        reporter.on_event(&event(EventKind::Tick {
            percent: 50,
            state: ProgressState {
                amount_transferred: 50,
                total_expected: 100,
                completed_count: 1,
                failed_count: 0,
            },
        }));
        assert_eq!(reporter.position("s3://b/app/"), Some(50));
    }
}
