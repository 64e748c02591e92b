//! Configuration types for sector-sync

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::Path, path::PathBuf, time::Duration};

/// Environment variable consulted when `platform.query_url` is empty
pub const ENV_QUERY_URL: &str = "SECTOR_SYNC_QUERY_URL";
/// Environment variable consulted when `platform.callback_url` is empty
pub const ENV_CALLBACK_URL: &str = "SECTOR_SYNC_CALLBACK_URL";
/// Environment variable consulted when `platform.download_url` is empty
pub const ENV_DOWNLOAD_URL: &str = "SECTOR_SYNC_DOWNLOAD_URL";
/// Environment variable consulted when `platform.heartbeat_url` is empty
pub const ENV_HEARTBEAT_URL: &str = "SECTOR_SYNC_HEARTBEAT_URL";

/// Remote platform endpoints and credentials
///
/// Groups everything the agent needs to talk to the platform that assigns
/// sectors and serves their payloads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Base URL serving sealed files and cache archives
    #[serde(default)]
    pub download_url: String,

    /// Outcome report endpoint
    #[serde(default)]
    pub callback_url: String,

    /// Pending-sector discovery endpoint
    #[serde(default)]
    pub query_url: String,

    /// Liveness endpoint
    #[serde(default)]
    pub heartbeat_url: String,

    /// Token sent as `Token` on downloads and `minerToken` on platform calls
    #[serde(default)]
    pub token: String,

    /// Timeout for platform calls (default: 30 seconds)
    #[serde(default = "default_platform_timeout", with = "duration_serde")]
    pub timeout: Duration,

    /// Interval between discovery polls (default: 60 seconds)
    #[serde(default = "default_check_interval", with = "duration_serde")]
    pub check_interval: Duration,

    /// Interval between heartbeats (default: 30 seconds)
    #[serde(default = "default_heartbeat_interval", with = "duration_serde")]
    pub heartbeat_interval: Duration,

    /// Accept self-signed TLS certificates from the platform (default: false)
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            download_url: String::new(),
            callback_url: String::new(),
            query_url: String::new(),
            heartbeat_url: String::new(),
            token: String::new(),
            timeout: default_platform_timeout(),
            check_interval: default_check_interval(),
            heartbeat_interval: default_heartbeat_interval(),
            accept_invalid_certs: false,
        }
    }
}

/// Local miner and storage-service settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Miner actor address (e.g. "t01000")
    #[serde(default)]
    pub id: String,

    /// Directory holding sealed sector files
    #[serde(default = "default_sealed_dir")]
    pub sealed_dir: PathBuf,

    /// Directory holding unpacked sector cache trees
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Storage path ID the sectors are declared under
    #[serde(default)]
    pub storage_id: String,

    /// Storage-management service JSON-RPC endpoint
    #[serde(default)]
    pub rpc_address: String,

    /// Value of the `Authorization` header sent to the RPC endpoint
    #[serde(default)]
    pub rpc_token: String,

    /// Timeout for RPC calls (default: 10 seconds)
    #[serde(default = "default_rpc_timeout", with = "duration_serde")]
    pub rpc_timeout: Duration,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            sealed_dir: default_sealed_dir(),
            cache_dir: default_cache_dir(),
            storage_id: String::new(),
            rpc_address: String::new(),
            rpc_token: String::new(),
            rpc_timeout: default_rpc_timeout(),
        }
    }
}

/// Transfer pipeline tuning
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Maximum sectors in flight; also the work queue capacity (default: 3)
    #[serde(default = "default_max_downloader")]
    pub max_downloader: usize,

    /// Attempts per sector before it is abandoned (default: 3)
    #[serde(default = "default_max_download_retry")]
    pub max_download_retry: u32,

    /// Size of one ranged part in bytes (default: 64 MiB)
    #[serde(default = "default_part_size")]
    pub part_size: u64,

    /// Part workers per ranged download (default: 5)
    #[serde(default = "default_workers_per_download")]
    pub workers_per_download: usize,

    /// Scratch directory for cache archives before unpacking
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Timeout for a single download request (default: 600 seconds)
    #[serde(default = "default_download_timeout", with = "duration_serde")]
    pub download_timeout: Duration,

    /// Backoff applied between retries of a failed part
    #[serde(default)]
    pub part_retry: RetryConfig,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_downloader: default_max_downloader(),
            max_download_retry: default_max_download_retry(),
            part_size: default_part_size(),
            workers_per_download: default_workers_per_download(),
            work_dir: default_work_dir(),
            download_timeout: default_download_timeout(),
            part_retry: RetryConfig::default(),
        }
    }
}

/// Recent-completion dedup window
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DedupConfig {
    /// How long a completed sector is suppressed (default: 5 minutes)
    #[serde(default = "default_dedup_ttl", with = "duration_serde")]
    pub ttl: Duration,

    /// How often expired entries are swept (default: 10 minutes)
    #[serde(default = "default_sweep_interval", with = "duration_serde")]
    pub sweep_interval: Duration,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            ttl: default_dedup_ttl(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

/// Retry configuration for transient failures
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts for bounded retries (default: 5)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// Main configuration for the sector agent
///
/// - [`platform`](PlatformConfig): remote endpoints and token
/// - [`miner`](MinerConfig): local directories and storage service
/// - [`transfer`](TransferConfig): concurrency, retry ceiling, part sizing
/// - [`dedup`](DedupConfig): recent-completion window
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Remote platform settings
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Miner and storage-service settings
    #[serde(default)]
    pub miner: MinerConfig,

    /// Transfer pipeline settings
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Dedup window settings
    #[serde(default)]
    pub dedup: DedupConfig,
}

impl Config {
    /// Parse a JSON configuration document
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON configuration file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        Self::from_json_str(&content)
    }

    /// Fill empty platform URLs from the environment
    pub fn apply_env_fallbacks(&mut self) {
        self.apply_fallbacks_from(|key| std::env::var(key).ok());
    }

    fn apply_fallbacks_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let platform = &mut self.platform;
        for (field, key) in [
            (&mut platform.query_url, ENV_QUERY_URL),
            (&mut platform.callback_url, ENV_CALLBACK_URL),
            (&mut platform.download_url, ENV_DOWNLOAD_URL),
            (&mut platform.heartbeat_url, ENV_HEARTBEAT_URL),
        ] {
            if field.is_empty()
                && let Some(value) = lookup(key)
            {
                *field = value;
            }
        }
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.miner.id.trim().is_empty() {
            return Err(Error::config("miner.id", "miner id must not be empty"));
        }
        if self.transfer.part_size == 0 {
            return Err(Error::config(
                "transfer.part_size",
                "part size must be greater than zero",
            ));
        }
        if self.transfer.workers_per_download == 0 {
            return Err(Error::config(
                "transfer.workers_per_download",
                "at least one part worker is required",
            ));
        }
        if self.transfer.max_downloader == 0 {
            return Err(Error::config(
                "transfer.max_downloader",
                "at least one concurrent sector is required",
            ));
        }

        for (key, interval) in [
            ("platform.check_interval", self.platform.check_interval),
            ("platform.heartbeat_interval", self.platform.heartbeat_interval),
            ("dedup.sweep_interval", self.dedup.sweep_interval),
        ] {
            if interval.is_zero() {
                return Err(Error::config(key, "interval must be greater than zero"));
            }
        }

        let multiplier = self.transfer.part_retry.backoff_multiplier;
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(Error::config(
                "transfer.part_retry.backoff_multiplier",
                format!("backoff multiplier must be a positive number, got {}", multiplier),
            ));
        }

        for (key, value) in [
            ("platform.download_url", &self.platform.download_url),
            ("platform.callback_url", &self.platform.callback_url),
            ("platform.query_url", &self.platform.query_url),
            ("platform.heartbeat_url", &self.platform.heartbeat_url),
            ("miner.rpc_address", &self.miner.rpc_address),
        ] {
            if value.is_empty() {
                continue;
            }
            if let Err(e) = url::Url::parse(value) {
                return Err(Error::config(key, format!("invalid URL '{}': {}", value, e)));
            }
        }

        Ok(())
    }
}

fn default_platform_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_check_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_heartbeat_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_sealed_dir() -> PathBuf {
    PathBuf::from("./sealed")
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./cache")
}

fn default_rpc_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_max_downloader() -> usize {
    3
}

fn default_max_download_retry() -> u32 {
    3
}

fn default_part_size() -> u64 {
    64 * 1024 * 1024
}

fn default_workers_per_download() -> usize {
    5
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("./work")
}

fn default_download_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_dedup_ttl() -> Duration {
    Duration::from_secs(5 * 60)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(10 * 60)
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
