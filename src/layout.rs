//! Deterministic names, paths and URLs for a miner's sectors

use crate::config::Config;
use crate::types::SectorId;
use std::path::PathBuf;

/// Sector size segment of the cache-tree URL (32 GiB sectors)
const SECTOR_SIZE_GIB: u32 = 32;

/// Where a sector's payloads come from and where they land on disk
#[derive(Clone, Debug)]
pub struct SectorLayout {
    miner_id: String,
    download_url: String,
    sealed_dir: PathBuf,
    cache_dir: PathBuf,
    work_dir: PathBuf,
}

impl SectorLayout {
    /// Build the layout from configuration
    pub fn from_config(config: &Config) -> Self {
        Self {
            miner_id: config.miner.id.clone(),
            download_url: config.platform.download_url.trim_end_matches('/').to_string(),
            sealed_dir: config.miner.sealed_dir.clone(),
            cache_dir: config.miner.cache_dir.clone(),
            work_dir: config.transfer.work_dir.clone(),
        }
    }

    /// Miner this layout belongs to
    pub fn miner_id(&self) -> &str {
        &self.miner_id
    }

    /// `s-<miner>-<sector>`, shared by every on-disk artifact of the sector
    pub fn file_name(&self, id: SectorId) -> String {
        format!("s-{}-{}", self.miner_id, id)
    }

    /// Source of the sealed sector file
    pub fn sealed_url(&self, id: SectorId) -> String {
        format!("{}/sealedsectors/{}/{}", self.download_url, self.miner_id, id)
    }

    /// Destination of the sealed sector file
    pub fn sealed_target(&self, id: SectorId) -> PathBuf {
        self.sealed_dir.join(self.file_name(id))
    }

    /// Source of the cache-tree archive
    pub fn cache_url(&self, id: SectorId) -> String {
        format!(
            "{}/sectortree/{}/{}/{}",
            self.download_url, self.miner_id, SECTOR_SIZE_GIB, id
        )
    }

    /// Where the cache archive is downloaded before unpacking
    pub fn cache_archive(&self, id: SectorId) -> PathBuf {
        self.work_dir.join(self.file_name(id))
    }

    /// Root the cache archive is unpacked into
    pub fn cache_root(&self) -> &std::path::Path {
        &self.cache_dir
    }

    /// The sector's own cache directory
    pub fn cache_target(&self, id: SectorId) -> PathBuf {
        self.cache_dir.join(self.file_name(id))
    }
}
