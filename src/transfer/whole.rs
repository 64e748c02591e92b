//! Single-request transfer for sources that cannot be partitioned

use super::{ChunkFetcher, TOKEN_HEADER, truncate_body};
use crate::error::{Error, Result, TransferError};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

impl ChunkFetcher {
    /// Stream the whole body of `url` into `target`
    ///
    /// Returns the number of bytes written. When the server announces a
    /// `Content-Length`, a body of any other length is a
    /// [`TransferError::LengthMismatch`].
    pub(super) async fn fetch_whole(
        &self,
        url: &str,
        target: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        let request = self.client.get(url).header(TOKEN_HEADER, &self.token).send();
        let mut response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = request => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransferError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
                body: truncate_body(&body),
            }
            .into());
        }

        let announced = response.content_length();
        let mut file = tokio::fs::File::create(target).await?;
        let mut written = 0u64;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                chunk = response.chunk() => chunk?,
            };
            let Some(chunk) = chunk else {
                break;
            };
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        if let Some(expected) = announced
            && expected != written
        {
            return Err(TransferError::LengthMismatch {
                start: 0,
                end: expected.saturating_sub(1),
                expected,
                received: written,
            }
            .into());
        }

        Ok(written)
    }
}
