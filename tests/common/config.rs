//! Test configuration pointing every endpoint at one mock server

use sector_sync::config::RetryConfig;
use sector_sync::Config;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::MockServer;

/// Miner the end-to-end agent runs as
pub const MINER: &str = "t01000";

/// Storage path sectors are declared under
pub const STORAGE_ID: &str = "6b5bbb55-aaa2-4dec-8645-293b12c3d09c";

/// Route of the storage service JSON-RPC endpoint
pub const RPC_PATH: &str = "/rpc/v0";
/// Route of the discovery endpoint
pub const QUERY_PATH: &str = "/sectors/query";
/// Route of the outcome report endpoint
pub const CALLBACK_PATH: &str = "/sectors/callback";
/// Route of the heartbeat endpoint
pub const HEARTBEAT_PATH: &str = "/agent/ping";

/// Full agent configuration against `server`, with directories under `temp_dir`
///
/// Discovery and heartbeat run every 50 ms and part retries back off quickly
/// so scenarios finish in well under a second.
pub fn agent_config(server: &MockServer, temp_dir: &TempDir) -> Config {
    let base = server.uri();
    let mut config = Config::default();

    config.platform.download_url = base.clone();
    config.platform.query_url = format!("{}{}", base, QUERY_PATH);
    config.platform.callback_url = format!("{}{}", base, CALLBACK_PATH);
    config.platform.heartbeat_url = format!("{}{}", base, HEARTBEAT_PATH);
    config.platform.token = "miner-secret".to_string();
    config.platform.check_interval = Duration::from_millis(50);
    config.platform.heartbeat_interval = Duration::from_millis(50);

    config.miner.id = MINER.to_string();
    config.miner.sealed_dir = temp_dir.path().join("sealed");
    config.miner.cache_dir = temp_dir.path().join("cache");
    config.miner.storage_id = STORAGE_ID.to_string();
    config.miner.rpc_address = format!("{}{}", base, RPC_PATH);
    config.miner.rpc_token = "Bearer rpc-token".to_string();

    config.transfer.work_dir = temp_dir.path().join("work");
    config.transfer.max_downloader = 2;
    config.transfer.max_download_retry = 2;
    config.transfer.part_size = 700;
    config.transfer.workers_per_download = 3;
    config.transfer.part_retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(5),
        max_delay: Duration::from_millis(20),
        backoff_multiplier: 2.0,
        jitter: false,
    };

    config
}
