//! Collaborators of the sector pipeline
//!
//! The pipeline only sees the narrow traits defined here:
//! - [`SectorDeclarer`] registers fetched files with the storage-management service
//! - [`OutcomeReporter`] tells the platform how a sector ended
//! - [`WorkSource`] discovers pending sectors and reports liveness
//!
//! [`StorageRpcClient`] and [`PlatformClient`] are the HTTP implementations.

mod platform;
mod storage_rpc;


pub use platform::PlatformClient;
pub use storage_rpc::StorageRpcClient;

use crate::error::Result;
use crate::types::{SectorFileKind, SectorId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Status code reported for a successful outcome
pub const STATUS_CODE_SUCCESS: u32 = 10000;
/// Status code reported for a failed outcome
pub const STATUS_CODE_FAILED: u32 = 20000;

/// Registers a sector file with the storage-management service
#[async_trait]
pub trait SectorDeclarer: Send + Sync {
    /// Declare the `kind` file of sector `id` and confirm it is visible
    async fn declare(&self, id: SectorId, kind: SectorFileKind) -> Result<()>;
}

/// Reports sector outcomes to the platform
#[async_trait]
pub trait OutcomeReporter: Send + Sync {
    /// Deliver one outcome report
    async fn report(&self, report: &OutcomeReport) -> Result<()>;
}

/// Discovers sectors that need fetching
#[async_trait]
pub trait WorkSource: Send + Sync {
    /// Sector IDs currently pending for this miner
    async fn discover(&self) -> Result<Vec<SectorId>>;

    /// Report liveness along with the number of sectors discovered so far
    async fn heartbeat(&self, discovered_total: u64) -> Result<()>;
}

/// Which phase an outcome report is about
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeAction {
    /// Download (and the steps that follow it)
    Download,
    /// Declaration with the storage service
    Declare,
}

/// Result carried by an outcome report
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    /// The action completed
    Success,
    /// The action failed
    Failed,
}

/// Body of a platform outcome report
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeReport {
    /// Phase being reported
    pub action: OutcomeAction,
    /// Success or failure
    pub status: OutcomeStatus,
    /// [`STATUS_CODE_SUCCESS`] or [`STATUS_CODE_FAILED`]
    #[serde(rename = "statusCode")]
    pub status_code: u32,
    /// Sector the report is about
    #[serde(rename = "sectorID")]
    pub sector_id: SectorId,
    /// Miner the sector belongs to
    #[serde(rename = "minerID")]
    pub miner_id: String,
    /// Failure description, omitted on success
    #[serde(rename = "errMsg", default, skip_serializing_if = "String::is_empty")]
    pub err_msg: String,
}

impl OutcomeReport {
    /// A success report for `sector_id`
    pub fn success(action: OutcomeAction, sector_id: SectorId, miner_id: &str) -> Self {
        Self {
            action,
            status: OutcomeStatus::Success,
            status_code: STATUS_CODE_SUCCESS,
            sector_id,
            miner_id: miner_id.to_string(),
            err_msg: String::new(),
        }
    }

    /// A failure report for `sector_id`
    pub fn failure(
        action: OutcomeAction,
        sector_id: SectorId,
        miner_id: &str,
        err_msg: impl Into<String>,
    ) -> Self {
        Self {
            action,
            status: OutcomeStatus::Failed,
            status_code: STATUS_CODE_FAILED,
            sector_id,
            miner_id: miner_id.to_string(),
            err_msg: err_msg.into(),
        }
    }
}
