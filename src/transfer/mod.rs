//! Parallel resumable HTTP transfers
//!
//! [`ChunkFetcher`] turns one [`DownloadTask`] into a byte-identical local
//! file. It knows nothing about sectors.
//!
//! - **Ranged mode** probes the total length with `Range: bytes=0-1`,
//!   pre-sizes the target, splits it into [`DownloadPart`]s and lets a pool
//!   of workers fetch them. A failed part is requeued after a backoff delay
//!   until it succeeds or the task is cancelled.
//! - **Whole mode** streams a single GET straight into the target.
//!
//! An existing target is always treated as stale and removed first. Tasks
//! marked for unpacking extract the downloaded tar archive afterwards.

mod range;
mod whole;
mod worker;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_server;

pub use range::{DownloadPart, parse_content_range, schedule_parts};

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result, TransferError};
use crate::extraction;
use crate::retry::retry_bounded;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, RANGE};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use worker::{PartQueue, run_worker};

/// Header carrying the platform token on download requests
pub(crate) const TOKEN_HEADER: &str = "Token";

/// Longest response body kept in an error message
const MAX_ERROR_BODY: usize = 256;

/// How a task's bytes are fetched
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchMode {
    /// One GET, streamed straight into the target
    Whole,
    /// Fixed-size ranged parts fetched by a worker pool
    Ranged {
        /// Bytes per part
        part_size: u64,
        /// Concurrent part workers
        workers: usize,
    },
}

/// Where a downloaded archive is unpacked
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnpackTarget {
    /// Directory the archive is extracted into
    pub root: PathBuf,
    /// Sector-named directory created under `root` before extraction
    pub sector_dir: PathBuf,
}

/// One transfer: source, destination and how to get there
#[derive(Clone, Debug)]
pub struct DownloadTask {
    /// Source URL
    pub url: String,
    /// Local destination file
    pub target: PathBuf,
    /// Transfer mode
    pub mode: FetchMode,
    /// Extract the target as a tar archive once downloaded
    pub unpack: Option<UnpackTarget>,
}

impl DownloadTask {
    /// Whole-file transfer of `url` into `target`
    pub fn whole(url: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            target: target.into(),
            mode: FetchMode::Whole,
            unpack: None,
        }
    }

    /// Ranged transfer of `url` into `target`
    pub fn ranged(
        url: impl Into<String>,
        target: impl Into<PathBuf>,
        part_size: u64,
        workers: usize,
    ) -> Self {
        Self {
            url: url.into(),
            target: target.into(),
            mode: FetchMode::Ranged { part_size, workers },
            unpack: None,
        }
    }

    /// Unpack the downloaded archive into `root` after creating `sector_dir`
    pub fn unpack_into(mut self, root: impl Into<PathBuf>, sector_dir: impl Into<PathBuf>) -> Self {
        self.unpack = Some(UnpackTarget {
            root: root.into(),
            sector_dir: sector_dir.into(),
        });
        self
    }
}

/// Result of a settled transfer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Bytes written to the target
    pub bytes: u64,
    /// Files extracted from the archive, empty when nothing was unpacked
    pub unpacked: Vec<PathBuf>,
}

/// HTTP downloader shared by every transfer of the agent
#[derive(Clone, Debug)]
pub struct ChunkFetcher {
    client: reqwest::Client,
    token: String,
    retry: RetryConfig,
}

impl ChunkFetcher {
    /// Build a fetcher from the platform and transfer settings
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.transfer.download_timeout)
            .danger_accept_invalid_certs(config.platform.accept_invalid_certs)
            .build()?;
        Ok(Self::with_client(
            client,
            config.platform.token.clone(),
            config.transfer.part_retry.clone(),
        ))
    }

    /// Build a fetcher around an existing client
    ///
    /// `retry` paces part requeues and bounds the length probe.
    pub fn with_client(client: reqwest::Client, token: String, retry: RetryConfig) -> Self {
        Self {
            client,
            token,
            retry,
        }
    }

    /// Run `task` to completion
    ///
    /// Returns once every byte is on disk (and unpacked, if requested), or
    /// with the first structural error. Per-part failures never surface here.
    pub async fn fetch(
        &self,
        task: &DownloadTask,
        cancel: &CancellationToken,
    ) -> Result<FetchOutcome> {
        if let Some(parent) = task.target.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        remove_stale(&task.target).await?;

        let bytes = match task.mode {
            FetchMode::Whole => self.fetch_whole(&task.url, &task.target, cancel).await?,
            FetchMode::Ranged { part_size, workers } => {
                self.fetch_ranged(&task.url, &task.target, part_size, workers, cancel)
                    .await?
            }
        };

        tracing::debug!(url = %task.url, target = %task.target.display(), bytes, "Transfer complete");

        let unpacked = match &task.unpack {
            Some(unpack) => {
                tokio::fs::create_dir_all(&unpack.sector_dir).await?;
                extraction::unpack_tar(&task.target, &unpack.root).await?
            }
            None => Vec::new(),
        };

        Ok(FetchOutcome { bytes, unpacked })
    }

    /// Discover the total length from a two-byte ranged probe
    async fn probe_length(&self, url: &str) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .header(TOKEN_HEADER, &self.token)
            .header(RANGE, "bytes=0-1")
            .send()
            .await?;

        let status = response.status();
        // 416 still carries `bytes */<total>` for an empty source
        if !status.is_success() && status != StatusCode::RANGE_NOT_SATISFIABLE {
            let body = response.text().await.unwrap_or_default();
            return Err(TransferError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate_body(&body),
            }
            .into());
        }

        let unsupported = |reason: String| TransferError::RangeUnsupported {
            url: url.to_string(),
            reason,
        };

        let value = response
            .headers()
            .get(CONTENT_RANGE)
            .ok_or_else(|| unsupported("response carries no Content-Range header".into()))?
            .to_str()
            .map_err(|_| unsupported("Content-Range is not valid ASCII".into()))?;

        parse_content_range(value)
            .ok_or_else(|| unsupported(format!("malformed Content-Range '{}'", value)).into())
    }

    async fn fetch_ranged(
        &self,
        url: &str,
        target: &Path,
        part_size: u64,
        workers: usize,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let length = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            length = retry_bounded(&self.retry, "length probe", || self.probe_length(url)) => length?,
        };

        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(target)
            .await?;
        file.set_len(length).await?;
        let file = Arc::new(file.into_std().await);

        let parts = schedule_parts(length, part_size);
        if parts.is_empty() {
            return Ok(length);
        }
        let total = parts.len();

        let (parts_tx, parts_rx) = mpsc::channel(total);
        for part in &parts {
            parts_tx
                .try_send(*part)
                .map_err(|e| Error::Other(format!("failed to schedule part: {}", e)))?;
        }
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        let queue = Arc::new(PartQueue {
            client: self.client.clone(),
            url: url.to_string(),
            token: self.token.clone(),
            file,
            retry: self.retry.clone(),
            parts_tx,
            parts_rx: Mutex::new(parts_rx),
            done_tx,
        });

        let pool = cancel.child_token();
        let worker_count = workers.clamp(1, total);
        let mut pool_tasks = JoinSet::new();
        for worker_id in 0..worker_count {
            pool_tasks.spawn(run_worker(worker_id, Arc::clone(&queue), pool.clone()));
        }
        // Workers own the queue now; if they all exit the done channel closes
        drop(queue);

        tracing::debug!(url, length, parts = total, workers = worker_count, "Ranged transfer started");

        let mut completed = 0usize;
        let result = loop {
            if completed == total {
                break Ok(length);
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break Err(Error::Cancelled),
                done = done_rx.recv() => match done {
                    Some(part) => {
                        completed += 1;
                        tracing::trace!(url, start = part.start, end = part.end, completed, total, "Part done");
                    }
                    None => {
                        break Err(Error::Other(
                            "part workers exited before the transfer completed".into(),
                        ));
                    }
                },
            }
        };

        // Idle workers are parked on the queue; stop them
        pool.cancel();
        while let Some(joined) = pool_tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(url, error = %e, "Part worker panicked");
            }
        }

        result
    }
}

/// Delete a leftover target from an earlier attempt
async fn remove_stale(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Removed stale download target");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Cap a response body for inclusion in an error
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
