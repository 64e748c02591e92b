//! HTTP client for the sector platform

use super::{OutcomeReport, OutcomeReporter, WorkSource};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::transfer::truncate_body;
use crate::types::SectorId;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// Header carrying the platform token on platform calls
const MINER_TOKEN_HEADER: &str = "minerToken";

/// Agent status sent with every heartbeat
const AGENT_STATUS_NORMAL: u32 = 2;

#[derive(Debug, Default, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: QueryData,
}

#[derive(Debug, Default, Deserialize)]
struct QueryData {
    #[serde(default)]
    list: Vec<QueryItem>,
}

#[derive(Debug, Deserialize)]
struct QueryItem {
    #[serde(rename = "minerId", default)]
    miner_id: String,
    #[serde(rename = "sectorId", default)]
    sector_id: String,
}

#[derive(Debug, Serialize)]
struct Heartbeat {
    status: u32,
    need_download: u64,
}

/// Talks to the platform: sector discovery, heartbeats and outcome reports
///
/// Every call carries the configured token in the `minerToken` header.
#[derive(Clone, Debug)]
pub struct PlatformClient {
    client: reqwest::Client,
    query_url: String,
    callback_url: String,
    heartbeat_url: String,
    token: String,
    miner_id: String,
}

impl PlatformClient {
    /// Build a client from the platform and miner settings
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.platform.timeout)
            .danger_accept_invalid_certs(config.platform.accept_invalid_certs)
            .build()?;

        Ok(Self {
            client,
            query_url: config.platform.query_url.clone(),
            callback_url: config.platform.callback_url.clone(),
            heartbeat_url: config.platform.heartbeat_url.clone(),
            token: config.platform.token.clone(),
            miner_id: config.miner.id.clone(),
        })
    }

    /// POST `body` as JSON, requiring a 2xx answer
    async fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> Result<()> {
        let response = self
            .client
            .post(url)
            .header(MINER_TOKEN_HEADER, &self.token)
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Platform(format!(
                "{} returned HTTP {}: {}",
                url,
                status.as_u16(),
                truncate_body(&body)
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl OutcomeReporter for PlatformClient {
    async fn report(&self, report: &OutcomeReport) -> Result<()> {
        self.post_json(&self.callback_url, report).await?;
        tracing::debug!(
            sector_id = %report.sector_id,
            action = ?report.action,
            status = ?report.status,
            "outcome reported"
        );
        Ok(())
    }
}

#[async_trait]
impl WorkSource for PlatformClient {
    async fn discover(&self) -> Result<Vec<SectorId>> {
        let response = self
            .client
            .get(&self.query_url)
            .header(MINER_TOKEN_HEADER, &self.token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(Error::Platform(format!(
                "sector query returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: QueryResponse = response.json().await?;
        if !body.msg.eq_ignore_ascii_case("success") {
            return Err(Error::Platform(format!("sector query rejected: {}", body.msg)));
        }

        let mut sectors = Vec::with_capacity(body.data.list.len());
        for item in body.data.list {
            if item.miner_id != self.miner_id {
                continue;
            }
            match item.sector_id.parse::<SectorId>() {
                Ok(id) => sectors.push(id),
                Err(e) => {
                    tracing::warn!(
                        sector_id = %item.sector_id,
                        error = %e,
                        "skipping sector with unparsable id"
                    );
                }
            }
        }

        Ok(sectors)
    }

    async fn heartbeat(&self, discovered_total: u64) -> Result<()> {
        let heartbeat = Heartbeat {
            status: AGENT_STATUS_NORMAL,
            need_download: discovered_total,
        };
        self.post_json(&self.heartbeat_url, &heartbeat).await
    }
}
