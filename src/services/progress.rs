//! Progress reporting shared by concurrent downloads.
//!
//! Each download registers an indicator, updates its total and completed
//! bytes as the transfer advances, and finishes it when done. Sinks are
//! shared across tasks and must tolerate concurrent updates to independent
//! indicators.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};
use tracing::{debug, info};

pub type IndicatorId = u64;

/// Destination for per-item progress updates.
pub trait ProgressSink: Send + Sync {
    /// Start tracking a new item and return its handle.
    fn register(&self, label: &str) -> IndicatorId;

    /// Record the total size once it is known.
    fn set_total(&self, id: IndicatorId, total: u64);

    /// Record `bytes` more bytes as completed.
    fn advance(&self, id: IndicatorId, bytes: u64);

    /// Stop tracking the item, whether it succeeded or not.
    fn finish(&self, id: IndicatorId);
}

/// Aggregate view across all indicators of a sink.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub active: usize,
    pub finished: usize,
    pub completed_bytes: u64,
}

struct Indicator {
    label: String,
    total: Option<u64>,
    completed: u64,
    started: Instant,
    /// Last 10% step reported for this indicator.
    last_step: u64,
}

#[derive(Default)]
struct ProgressState {
    active: HashMap<IndicatorId, Indicator>,
    finished: usize,
    finished_bytes: u64,
}

/// Progress sink that reports through `tracing`.
///
/// Registration and completion are logged at `info`; every tenth of a known
/// total is logged at `debug`. Updates for unknown ids are ignored.
#[derive(Default)]
pub struct LogProgress {
    next_id: AtomicU64,
    state: Mutex<ProgressState>,
}

impl LogProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.lock();
        ProgressSnapshot {
            active: state.active.len(),
            finished: state.finished,
            completed_bytes: state.finished_bytes
                + state.active.values().map(|i| i.completed).sum::<u64>(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProgressState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressSink for LogProgress {
    fn register(&self, label: &str) -> IndicatorId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!("Downloading: {}", label);
        self.lock().active.insert(
            id,
            Indicator {
                label: label.to_string(),
                total: None,
                completed: 0,
                started: Instant::now(),
                last_step: 0,
            },
        );
        id
    }

    fn set_total(&self, id: IndicatorId, total: u64) {
        if let Some(indicator) = self.lock().active.get_mut(&id) {
            indicator.total = Some(total);
            debug!("{}: {} expected", indicator.label, human_bytes(total));
        }
    }

    fn advance(&self, id: IndicatorId, bytes: u64) {
        let mut state = self.lock();
        let Some(indicator) = state.active.get_mut(&id) else {
            return;
        };
        indicator.completed += bytes;

        if let Some(total) = indicator.total.filter(|t| *t > 0) {
            let step = (indicator.completed.min(total) * 10) / total;
            if step > indicator.last_step {
                indicator.last_step = step;
                debug!(
                    "{}: {}% ({} / {})",
                    indicator.label,
                    step * 10,
                    human_bytes(indicator.completed),
                    human_bytes(total)
                );
            }
        }
    }

    fn finish(&self, id: IndicatorId) {
        let mut state = self.lock();
        let Some(indicator) = state.active.remove(&id) else {
            return;
        };
        state.finished += 1;
        state.finished_bytes += indicator.completed;

        let elapsed = indicator.started.elapsed();
        let rate = indicator.completed as f64 / elapsed.as_secs_f64().max(0.001);
        info!(
            "Finished: {} ({} in {:.1}s, {}/s)",
            indicator.label,
            human_bytes(indicator.completed),
            elapsed.as_secs_f64(),
            human_bytes(rate as u64)
        );
    }
}

/// Render a byte count with binary units, e.g. `1.5 MiB`.
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_register_advance_finish() {
        let sink = LogProgress::new();
        let id = sink.register("acct:/box/a.txt");
        sink.set_total(id, 4096);
        sink.advance(id, 1024);
        sink.advance(id, 1024);

        assert_eq!(
            sink.snapshot(),
            ProgressSnapshot {
                active: 1,
                finished: 0,
                completed_bytes: 2048,
            }
        );

        sink.finish(id);
        assert_eq!(
            sink.snapshot(),
            ProgressSnapshot {
                active: 0,
                finished: 1,
                completed_bytes: 2048,
            }
        );
    }

    #[test]
    fn test_unknown_ids_ignored() {
        let sink = LogProgress::new();
        sink.advance(42, 10);
        sink.set_total(42, 10);
        sink.finish(42);
        assert_eq!(sink.snapshot(), ProgressSnapshot::default());
    }

    #[test]
    fn test_concurrent_indicators() {
        let sink = LogProgress::shared();

        thread::scope(|scope| {
            for n in 0..16 {
                let sink = &sink;
                scope.spawn(move || {
                    let id = sink.register(&format!("item-{n}"));
                    sink.set_total(id, 100 * 1024);
                    for _ in 0..100 {
                        sink.advance(id, 1024);
                    }
                    sink.finish(id);
                });
            }
        });

        let snapshot = sink.snapshot();
        assert_eq!(snapshot.active, 0);
        assert_eq!(snapshot.finished, 16);
        assert_eq!(snapshot.completed_bytes, 16 * 100 * 1024);
    }

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1023), "1023 B");
        assert_eq!(human_bytes(1536), "1.5 KiB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.0 MiB");
    }
}
