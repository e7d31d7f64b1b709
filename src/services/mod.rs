//! Network and filesystem services: listing, downloading, batching, progress.

pub mod batch_service;
pub mod download_service;
pub mod listing_service;
pub mod progress;

pub use batch_service::{BatchReport, BatchRunner, DEFAULT_CONCURRENCY, FailedItem};
pub use download_service::{
    CHUNK_SIZE, DownloadError, DownloadTask, Downloader, TransferObserver, destination_path,
};
pub use listing_service::{Listing, ListingClient, ListingError, parse_listing};
pub use progress::{LogProgress, ProgressSink, ProgressSnapshot};
