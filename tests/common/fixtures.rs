//! Sector payloads and a mock platform serving them

use super::config::{CALLBACK_PATH, HEARTBEAT_PATH, MINER, QUERY_PATH, RPC_PATH};
use sector_sync::SectorId;
use serde_json::{Value, json};
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Sealed file contents for `id`
pub fn sealed_bytes(id: SectorId) -> Vec<u8> {
    (0..4096u32)
        .map(|i| (i.wrapping_mul(31) as u64 ^ id.get()) as u8)
        .collect()
}

/// Files inside the cache tree of every sector, relative to its directory
pub const CACHE_FILES: [(&str, usize); 3] = [
    ("p_aux", 64),
    ("t_aux", 96),
    ("sc-02-data-tree-r-last-0.dat", 2500),
];

/// Cache tree archive for `id`, rooted at `s-<miner>-<id>/`
pub fn cache_archive(id: SectorId) -> Vec<u8> {
    let root = format!("s-{}-{}", MINER, id);
    let mut builder = tar::Builder::new(Vec::new());
    for (name, size) in CACHE_FILES {
        let content = vec![(id.get() as u8).wrapping_add(size as u8); size];
        let mut header = tar::Header::new_gnu();
        header.set_size(size as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/{}", root, name), content.as_slice())
            .unwrap();
    }
    builder.into_inner().unwrap()
}

/// Serves a body honoring single `bytes=start-end` ranges
pub struct RangeBody(pub Arc<Vec<u8>>);

impl Respond for RangeBody {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let total = self.0.len();
        let range = request
            .headers
            .get("range")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("bytes="))
            .and_then(|spec| spec.split_once('-'))
            .and_then(|(start, end)| Some((start.parse::<usize>().ok()?, end.parse::<usize>().ok()?)));

        match range {
            None => ResponseTemplate::new(200).set_body_bytes(self.0.as_slice().to_vec()),
            Some((start, end)) => {
                let end = end.min(total - 1);
                ResponseTemplate::new(206)
                    .insert_header("Content-Range", format!("bytes {}-{}/{}", start, end, total))
                    .set_body_bytes(self.0[start..=end].to_vec())
            }
        }
    }
}

/// Mount download routes for `id`
pub async fn serve_payloads(server: &MockServer, id: SectorId) {
    Mock::given(method("GET"))
        .and(path(format!("/sealedsectors/{}/{}", MINER, id)))
        .and(header("Token", "miner-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(sealed_bytes(id)))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/sectortree/{}/32/{}", MINER, id)))
        .and(header("Token", "miner-secret"))
        .respond_with(RangeBody(Arc::new(cache_archive(id))))
        .mount(server)
        .await;
}

/// Mount a discovery route returning `sectors` for this miner plus one foreign entry
pub async fn serve_discovery(server: &MockServer, sectors: &[SectorId]) {
    let mut list: Vec<Value> = sectors
        .iter()
        .map(|id| json!({"minerId": MINER, "sectorId": id.to_string(), "sectorType": 1}))
        .collect();
    list.push(json!({"minerId": "t09999", "sectorId": "1", "sectorType": 1}));

    Mock::given(method("GET"))
        .and(path(QUERY_PATH))
        .and(header("minerToken", "miner-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "msg": "Success",
            "data": {"list": list}
        })))
        .mount(server)
        .await;
}

/// Mount the storage service; `visible` controls whether declared files are found
pub async fn serve_storage(server: &MockServer, visible: bool) {
    Mock::given(method("POST"))
        .and(path(RPC_PATH))
        .and(header("Authorization", "Bearer rpc-token"))
        .and(body_partial_json(json!({"method": "Filecoin.StorageDeclareSector"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 0, "result": null
        })))
        .mount(server)
        .await;

    let found = if visible {
        json!([{"ID": "6b5bbb55-aaa2-4dec-8645-293b12c3d09c", "CanSeal": true}])
    } else {
        json!([])
    };
    Mock::given(method("POST"))
        .and(path(RPC_PATH))
        .and(body_partial_json(json!({"method": "Filecoin.StorageFindSector"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0", "id": 0, "result": found
        })))
        .mount(server)
        .await;
}

/// Mount callback and heartbeat routes that accept everything
pub async fn serve_reports(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(CALLBACK_PATH))
        .and(header("minerToken", "miner-secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"code": 200, "msg": "success"})))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(HEARTBEAT_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(server)
        .await;
}

/// JSON bodies the server received on `route`
pub async fn received_json(server: &MockServer, route: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|request| request.url.path() == route)
        .filter_map(|request| serde_json::from_slice(&request.body).ok())
        .collect()
}
