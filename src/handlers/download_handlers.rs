//! `--download`: fetch every selected object into the output directory.

use crate::{
    config::AppConfig,
    models::ObjectCollection,
    services::{BatchReport, BatchRunner, Downloader, LogProgress},
};
use reqwest::Client;

/// Run the batch for `objects` and return its report.
///
/// Per-object failures are already logged by the runner and only show up
/// in the report; they never fail the command.
pub async fn download_all(cfg: &AppConfig, http: Client, objects: ObjectCollection) -> BatchReport {
    if objects.is_empty() {
        tracing::info!("Nothing to download");
        return BatchReport::default();
    }

    tracing::info!(
        "Downloading {} objects to {} ({} at a time)",
        objects.len(),
        cfg.output_dir.display(),
        cfg.concurrency
    );

    let downloader = Downloader::new(http).with_checksum_verification(cfg.verify_checksums);
    let runner = BatchRunner::new(downloader, LogProgress::shared(), cfg.output_dir.clone())
        .with_concurrency(cfg.concurrency);

    runner.run_all(objects).await
}
