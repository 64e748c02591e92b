//! Part workers for ranged transfers
//!
//! Every worker pulls parts from the shared queue, fetches the span with a
//! ranged GET and writes it at its offset. A failed part goes back on the
//! queue after a backoff delay; workers only stop when their token fires.

use super::TOKEN_HEADER;
use super::range::DownloadPart;
use crate::config::RetryConfig;
use crate::error::{Error, Result, TransferError};
use crate::retry::Backoff;
use reqwest::header::RANGE;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

/// Bytes buffered before a positional write is issued
const WRITE_BUFFER_SIZE: usize = 1024 * 1024;

/// Positional file write, equivalent to `pwrite`.
#[cfg(unix)]
fn write_all_at(file: &std::fs::File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buf, offset)
}

/// Positional file write, equivalent to `pwrite`.
#[cfg(windows)]
fn write_all_at(file: &std::fs::File, buf: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut written = 0;
    while written < buf.len() {
        let n = file.seek_write(&buf[written..], offset + written as u64)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "failed to write whole buffer",
            ));
        }
        written += n;
    }
    Ok(())
}

/// State shared by the workers of one ranged transfer
pub(super) struct PartQueue {
    pub(super) client: reqwest::Client,
    pub(super) url: String,
    pub(super) token: String,
    pub(super) file: Arc<std::fs::File>,
    pub(super) retry: RetryConfig,
    /// Sender side, used both for scheduling and for requeueing failed parts
    pub(super) parts_tx: mpsc::Sender<DownloadPart>,
    pub(super) parts_rx: Mutex<mpsc::Receiver<DownloadPart>>,
    /// One message per completed part
    pub(super) done_tx: mpsc::UnboundedSender<DownloadPart>,
}

impl PartQueue {
    async fn next_part(&self) -> Option<DownloadPart> {
        self.parts_rx.lock().await.recv().await
    }
}

/// Run one worker until `cancel` fires
pub(super) async fn run_worker(worker_id: usize, queue: Arc<PartQueue>, cancel: CancellationToken) {
    let mut backoff = Backoff::new(&queue.retry);

    loop {
        let part = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            part = queue.next_part() => match part {
                Some(part) => part,
                None => break,
            },
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = fetch_part(&queue, part) => result,
        };

        match result {
            Ok(()) => {
                backoff.reset();
                if queue.done_tx.send(part).is_err() {
                    break;
                }
            }
            Err(e) => {
                let delay = backoff.next_delay();
                tracing::debug!(
                    worker_id,
                    url = %queue.url,
                    start = part.start,
                    end = part.end,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "Part failed, requeueing"
                );

                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                // Capacity equals the part count, so this never waits
                if queue.parts_tx.send(part).await.is_err() {
                    break;
                }
            }
        }
    }

    tracing::trace!(worker_id, url = %queue.url, "Part worker stopped");
}

/// Fetch one part and write it at its offset
///
/// The body must be exactly the part's length; anything else is a
/// [`TransferError::LengthMismatch`] and nothing past the part's end is written.
async fn fetch_part(queue: &PartQueue, part: DownloadPart) -> Result<()> {
    let mut response = queue
        .client
        .get(&queue.url)
        .header(TOKEN_HEADER, &queue.token)
        .header(RANGE, part.header_value())
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(TransferError::HttpStatus {
            url: queue.url.clone(),
            status: status.as_u16(),
            body: String::new(),
        }
        .into());
    }

    let expected = part.byte_count();
    let mut received = 0u64;
    let mut offset = part.start;
    let mut buffer = Vec::with_capacity((expected as usize).min(WRITE_BUFFER_SIZE));

    while let Some(chunk) = response.chunk().await? {
        received += chunk.len() as u64;
        if received > expected {
            return Err(TransferError::LengthMismatch {
                start: part.start,
                end: part.end,
                expected,
                received,
            }
            .into());
        }

        buffer.extend_from_slice(&chunk);
        if buffer.len() >= WRITE_BUFFER_SIZE {
            offset = write_at(&queue.file, std::mem::take(&mut buffer), offset).await?;
        }
    }

    if received != expected {
        return Err(TransferError::LengthMismatch {
            start: part.start,
            end: part.end,
            expected,
            received,
        }
        .into());
    }

    if !buffer.is_empty() {
        write_at(&queue.file, buffer, offset).await?;
    }

    Ok(())
}

/// Write `data` at `offset` off the async runtime, returning the next offset
async fn write_at(file: &Arc<std::fs::File>, data: Vec<u8>, offset: u64) -> Result<u64> {
    let file = Arc::clone(file);
    let len = data.len() as u64;
    tokio::task::spawn_blocking(move || write_all_at(&file, &data, offset))
        .await
        .map_err(|e| Error::Other(format!("part write task failed: {}", e)))??;
    Ok(offset + len)
}
