//! JSON-RPC client for the storage-management service

use super::SectorDeclarer;
use crate::config::MinerConfig;
use crate::error::{Error, Result};
use crate::transfer::truncate_body;
use crate::types::{SectorFileKind, SectorId};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const METHOD_DECLARE_SECTOR: &str = "Filecoin.StorageDeclareSector";
const METHOD_FIND_SECTOR: &str = "Filecoin.StorageFindSector";

/// Sector size passed to the find call (32 GiB)
const SECTOR_SIZE_BYTES: u64 = 34_359_738_368;

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    id: u64,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// `{"Miner": <actor number>, "Number": <sector>}`
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SectorRef {
    miner: u64,
    number: u64,
}

/// Declares sector files through `Filecoin.StorageDeclareSector`
///
/// Every declaration is confirmed with `Filecoin.StorageFindSector`; a
/// declaration the service does not report back is a failure.
#[derive(Clone, Debug)]
pub struct StorageRpcClient {
    client: reqwest::Client,
    url: String,
    token: String,
    miner_number: u64,
    storage_id: String,
}

impl StorageRpcClient {
    /// Build a client from the miner settings
    ///
    /// Fails if the miner id has no numeric actor part.
    pub fn new(config: &MinerConfig) -> Result<Self> {
        let miner_number = numeric_miner_id(&config.id).ok_or_else(|| {
            Error::config(
                "miner.id",
                format!("cannot derive an actor number from '{}'", config.id),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.rpc_timeout)
            .build()?;

        Ok(Self {
            client,
            url: config.rpc_address.clone(),
            token: config.rpc_token.clone(),
            miner_number,
            storage_id: config.storage_id.clone(),
        })
    }

    fn sector_ref(&self, id: SectorId) -> SectorRef {
        SectorRef {
            miner: self.miner_number,
            number: id.get(),
        }
    }

    /// Whether the service knows the `kind` file of sector `id`
    pub async fn find(&self, id: SectorId, kind: SectorFileKind) -> Result<bool> {
        let params = json!([self.sector_ref(id), kind.code(), SECTOR_SIZE_BYTES, true]);
        let result = self.call(id, kind, METHOD_FIND_SECTOR, params).await?;
        Ok(matches!(result, Value::Array(ref entries) if !entries.is_empty()))
    }

    async fn call(
        &self,
        id: SectorId,
        kind: SectorFileKind,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            id: 0,
            params,
        };

        let response = self
            .client
            .post(&self.url)
            .header(AUTHORIZATION, &self.token)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Declare {
                sector_id: id,
                kind,
                reason: format!("{} returned HTTP {}: {}", method, status.as_u16(), truncate_body(&body)),
            });
        }

        let body: RpcResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(Error::Declare {
                sector_id: id,
                kind,
                reason: format!("{} failed ({}): {}", method, error.code, error.message),
            });
        }

        Ok(body.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl SectorDeclarer for StorageRpcClient {
    async fn declare(&self, id: SectorId, kind: SectorFileKind) -> Result<()> {
        let params = json!([self.storage_id, self.sector_ref(id), kind.code(), true]);
        self.call(id, kind, METHOD_DECLARE_SECTOR, params).await?;

        if !self.find(id, kind).await? {
            return Err(Error::Declare {
                sector_id: id,
                kind,
                reason: "declared but not found".to_string(),
            });
        }

        tracing::info!(sector_id = %id, kind = %kind, storage_id = %self.storage_id, "sector file declared");
        Ok(())
    }
}

/// Actor number of a miner address (`t01000` -> `1000`)
///
/// Strips the network prefix (`t` or `f`) and the actor-class digit `0`.
pub(crate) fn numeric_miner_id(id: &str) -> Option<u64> {
    let id = id.trim();
    let id = id
        .strip_prefix('t')
        .or_else(|| id.strip_prefix('f'))
        .unwrap_or(id);
    let id = id.strip_prefix('0').unwrap_or(id);
    id.parse().ok()
}
