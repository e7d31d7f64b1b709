//! src/services/download_service.rs
//!
//! Downloader: streams a single blob to `{output_root}/{account}/{url path}`.
//! Bytes are written in small chunks and flushed as they arrive, so a
//! partially downloaded file is intact up to the last completed chunk.

use crate::models::ObjectDescriptor;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Client, StatusCode};
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;

/// Size of each write (and progress update) while streaming a body.
pub const CHUNK_SIZE: usize = 1024;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("request to `{url}` failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("`{url}` returned {status}")]
    Status { url: String, status: StatusCode },
    #[error("writing `{}` failed: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("checksum mismatch for `{}`: expected {expected}, got {actual}", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },
}

pub type DownloadResult<T> = Result<T, DownloadError>;

/// Callbacks invoked while a download is streaming.
pub trait TransferObserver {
    /// Called once with the response's content length, when it has one.
    fn size_known(&mut self, _total: u64) {}

    /// Called after each chunk has been written and flushed.
    fn bytes_written(&mut self, _bytes: u64) {}
}

impl TransferObserver for () {}

/// One download, from scheduling to completion.
#[derive(Debug)]
pub struct DownloadTask {
    pub descriptor: Arc<ObjectDescriptor>,
    pub destination: PathBuf,
    bytes_written: u64,
    total: Option<u64>,
}

impl DownloadTask {
    pub fn new(descriptor: Arc<ObjectDescriptor>, output_root: &Path) -> Self {
        let destination = destination_path(output_root, &descriptor);
        Self {
            descriptor,
            destination,
            bytes_written: 0,
            total: None,
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Content length reported by the server, if any.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    fn write_error(&self, source: io::Error) -> DownloadError {
        DownloadError::Write {
            path: self.destination.clone(),
            source,
        }
    }
}

/// Where `descriptor` lands below `output_root`.
pub fn destination_path(output_root: &Path, descriptor: &ObjectDescriptor) -> PathBuf {
    output_root
        .join(descriptor.account())
        .join(descriptor.relative_path())
}

/// Streams blobs to disk over a shared HTTP client.
#[derive(Clone, Debug)]
pub struct Downloader {
    http: Client,
    verify_checksums: bool,
}

impl Downloader {
    pub fn new(http: Client) -> Self {
        Self {
            http,
            verify_checksums: true,
        }
    }

    /// Compare the listing's `Content-MD5` against the downloaded bytes.
    pub fn with_checksum_verification(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Download `descriptor` below `output_root`, overwriting any existing file.
    ///
    /// No retries: the first request, status, or write failure ends the
    /// transfer and is returned to the caller.
    pub async fn download<O>(
        &self,
        descriptor: Arc<ObjectDescriptor>,
        output_root: &Path,
        observer: &mut O,
    ) -> DownloadResult<DownloadTask>
    where
        O: TransferObserver + Send,
    {
        let mut task = DownloadTask::new(descriptor, output_root);
        let url = task.descriptor.url().clone();
        let request_error = |source| DownloadError::Request {
            url: url.to_string(),
            source,
        };

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: url.to_string(),
                status,
            });
        }

        if let Some(total) = response.content_length() {
            task.total = Some(total);
            observer.size_known(total);
        }

        if let Some(parent) = task.destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|err| task.write_error(err))?;
        }
        let mut file = File::create(&task.destination)
            .await
            .map_err(|err| task.write_error(err))?;
        debug!("Writing {} to {}", url, task.destination.display());

        let mut digest = md5::Context::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk: Bytes = chunk.map_err(request_error)?;
            for piece in chunk.chunks(CHUNK_SIZE) {
                file.write_all(piece)
                    .await
                    .map_err(|err| task.write_error(err))?;
                file.flush().await.map_err(|err| task.write_error(err))?;
                digest.consume(piece);
                task.bytes_written += piece.len() as u64;
                observer.bytes_written(piece.len() as u64);
            }
        }

        if self.verify_checksums {
            if let Some(expected) = task.descriptor.content_md5() {
                let actual = general_purpose::STANDARD.encode(digest.compute().0);
                if actual != expected.trim() {
                    return Err(DownloadError::ChecksumMismatch {
                        path: task.destination.clone(),
                        expected: expected.trim().to_string(),
                        actual,
                    });
                }
            }
        }

        Ok(task)
    }
}
