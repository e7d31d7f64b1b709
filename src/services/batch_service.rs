//! src/services/batch_service.rs
//!
//! BatchRunner: downloads a set of objects with a bounded number of
//! transfers in flight. Each object runs as its own task; a failure (or a
//! panic) in one task is recorded and never cancels its siblings. The batch
//! returns only after every scheduled task has ended.

use super::{
    download_service::{DownloadError, Downloader, TransferObserver},
    progress::{IndicatorId, ProgressSink, human_bytes},
};
use crate::models::ObjectDescriptor;
use std::{collections::HashMap, path::PathBuf, sync::Arc};
use tokio::{
    sync::Semaphore,
    task::{Id, JoinError, JoinSet},
};
use tracing::{error, info};

/// Transfers allowed in flight when no width is configured.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// An object that could not be downloaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailedItem {
    pub label: String,
    pub error: String,
}

/// Outcome of a finished batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub scheduled: usize,
    pub succeeded: usize,
    pub failed: Vec<FailedItem>,
    pub bytes_written: u64,
}

impl BatchReport {
    fn record(&mut self, label: String, outcome: Result<Result<u64, DownloadError>, JoinError>) {
        match outcome {
            Ok(Ok(bytes)) => {
                self.succeeded += 1;
                self.bytes_written += bytes;
            }
            Ok(Err(err)) => self.failed.push(FailedItem {
                label,
                error: err.to_string(),
            }),
            Err(err) => {
                error!("Download task for {} did not complete: {}", label, err);
                self.failed.push(FailedItem {
                    label,
                    error: format!("download task did not complete: {}", err),
                });
            }
        }
    }
}

/// Progress indicator owned by one download task.
///
/// Finishes itself on drop, so the indicator is released even when the
/// task errors out or panics.
struct IndicatorGuard {
    sink: Arc<dyn ProgressSink>,
    id: IndicatorId,
}

impl IndicatorGuard {
    fn register(sink: Arc<dyn ProgressSink>, label: &str) -> Self {
        let id = sink.register(label);
        Self { sink, id }
    }
}

impl TransferObserver for IndicatorGuard {
    fn size_known(&mut self, total: u64) {
        self.sink.set_total(self.id, total);
    }

    fn bytes_written(&mut self, bytes: u64) {
        self.sink.advance(self.id, bytes);
    }
}

impl Drop for IndicatorGuard {
    fn drop(&mut self) {
        self.sink.finish(self.id);
    }
}

/// Bounded-concurrency download orchestrator.
#[derive(Clone)]
pub struct BatchRunner {
    downloader: Downloader,
    progress: Arc<dyn ProgressSink>,
    output_root: PathBuf,
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(
        downloader: Downloader,
        progress: Arc<dyn ProgressSink>,
        output_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            downloader,
            progress,
            output_root: output_root.into(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Set the pool width. Values below 1 are treated as 1.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Download every descriptor and wait for all of them to end.
    pub async fn run_all<I>(&self, descriptors: I) -> BatchReport
    where
        I: IntoIterator<Item = Arc<ObjectDescriptor>>,
    {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut labels: HashMap<Id, String> = HashMap::new();
        let mut report = BatchReport::default();

        for descriptor in descriptors {
            // The semaphore is never closed, so acquiring only waits for a slot.
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };

            let label = descriptor.label();
            let downloader = self.downloader.clone();
            let progress = self.progress.clone();
            let output_root = self.output_root.clone();
            let task_label = label.clone();

            let handle = tasks.spawn(async move {
                let _permit = permit;
                let mut indicator = IndicatorGuard::register(progress, &task_label);
                match downloader
                    .download(descriptor, &output_root, &mut indicator)
                    .await
                {
                    Ok(task) => Ok(task.bytes_written()),
                    Err(err) => {
                        error!("Error downloading {}: {}", task_label, err);
                        Err(err)
                    }
                }
            });
            labels.insert(handle.id(), label);
            report.scheduled += 1;

            while let Some(outcome) = tasks.try_join_next_with_id() {
                record(&mut report, &mut labels, outcome);
            }
        }

        while let Some(outcome) = tasks.join_next_with_id().await {
            record(&mut report, &mut labels, outcome);
        }

        info!(
            "Batch finished: {} of {} downloaded ({}), {} failed",
            report.succeeded,
            report.scheduled,
            human_bytes(report.bytes_written),
            report.failed.len()
        );
        report
    }
}

fn record(
    report: &mut BatchReport,
    labels: &mut HashMap<Id, String>,
    outcome: Result<(Id, Result<u64, DownloadError>), JoinError>,
) {
    let (id, outcome) = match outcome {
        Ok((id, result)) => (id, Ok(result)),
        Err(err) => (err.id(), Err(err)),
    };
    let label = labels.remove(&id).unwrap_or_default();
    report.record(label, outcome);
}
