//! Archive extraction for sector cache trees
//!
//! Cache payloads arrive as plain tar streams. Extraction keeps the archive's
//! directory structure and file modes and runs on the blocking pool.

mod tar;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

pub use self::tar::TarExtractor;

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Unpack the tar archive at `archive_path` into `dest_path`
///
/// # Arguments
/// * `archive_path` - Path to the downloaded archive
/// * `dest_path` - Directory entries are extracted under
///
/// # Returns
/// * `Ok(Vec<PathBuf>)` - Regular files written, in archive order
/// * `Err(Error::Unpack)` - Corrupt or truncated archive, or a write failure
///
/// # Example
/// ```no_run
/// use sector_sync::extraction::unpack_tar;
/// use std::path::PathBuf;
///
/// # async fn example() -> sector_sync::error::Result<()> {
/// let files = unpack_tar(
///     &PathBuf::from("/work/s-t01000-21"),
///     &PathBuf::from("/cache"),
/// ).await?;
/// println!("Extracted {} files", files.len());
/// # Ok(())
/// # }
/// ```
pub async fn unpack_tar(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
    let archive = archive_path.to_path_buf();
    let dest = dest_path.to_path_buf();

    let files = tokio::task::spawn_blocking(move || TarExtractor::extract(&archive, &dest))
        .await
        .map_err(|e| Error::Unpack {
            archive: archive_path.to_path_buf(),
            reason: format!("extraction task failed: {}", e),
        })??;

    info!(
        archive = %archive_path.display(),
        dest = %dest_path.display(),
        files = files.len(),
        "archive unpacked"
    );

    Ok(files)
}
