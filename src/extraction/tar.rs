use crate::error::{Error, Result};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Tar archive extractor
pub struct TarExtractor;

impl TarExtractor {
    /// Extract every entry of `archive_path` under `dest_path` (blocking)
    ///
    /// Entries whose path would escape `dest_path` are skipped with a warning.
    /// Existing files are overwritten.
    pub fn extract(archive_path: &Path, dest_path: &Path) -> Result<Vec<PathBuf>> {
        let unpack_err = |reason: String| Error::Unpack {
            archive: archive_path.to_path_buf(),
            reason,
        };

        std::fs::create_dir_all(dest_path)?;
        let file = File::open(archive_path)?;

        let mut archive = ::tar::Archive::new(BufReader::new(file));
        archive.set_preserve_permissions(true);
        archive.set_preserve_mtime(true);
        archive.set_overwrite(true);

        let entries = archive
            .entries()
            .map_err(|e| unpack_err(format!("failed to read archive: {}", e)))?;

        let mut extracted = Vec::new();
        for entry in entries {
            let mut entry =
                entry.map_err(|e| unpack_err(format!("failed to read entry: {}", e)))?;

            let entry_path = entry
                .path()
                .map_err(|e| unpack_err(format!("invalid entry path: {}", e)))?
                .into_owned();
            let is_file = entry.header().entry_type().is_file();

            let unpacked = entry.unpack_in(dest_path).map_err(|e| {
                unpack_err(format!("failed to extract {}: {}", entry_path.display(), e))
            })?;
            if !unpacked {
                warn!(entry = %entry_path.display(), "skipping entry with unsafe path");
                continue;
            }

            if is_file {
                debug!(entry = %entry_path.display(), "extracted");
                extracted.push(dest_path.join(&entry_path));
            }
        }

        Ok(extracted)
    }
}
