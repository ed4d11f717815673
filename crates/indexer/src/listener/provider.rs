//! Starknet JSON-RPC block source.
//!
//! Blocks come from `starknet_getBlockWithTxHashes`; registry events from
//! `starknet_getEvents`, filtered by contract address and the two event
//! selectors and paged with `continuation_token`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use scrypo_core::Felt;

use super::events::{Block, ChainEvent, EventKind};
use super::stream::{BlockSource, StreamError};
use crate::storage::Finality;

/// JSON-RPC code for "Block not found".
const BLOCK_NOT_FOUND: i64 = 24;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP JSON-RPC provider for Starknet.
pub struct RpcProvider {
    client: Client,
    rpc_url: String,
    contract: Felt,
    chunk_size: u64,
    request_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Header fields of `starknet_getBlockWithTxHashes`.
///
/// The pending block has no hash or number.
#[derive(Debug, Clone, Deserialize)]
struct BlockHeader {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    block_hash: Option<Felt>,
    parent_hash: Felt,
    #[serde(default)]
    block_number: Option<u64>,
    timestamp: u64,
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    events: Vec<EmittedEvent>,
    #[serde(default)]
    continuation_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct EmittedEvent {
    keys: Vec<Felt>,
    data: Vec<Felt>,
    transaction_hash: Felt,
}

impl RpcProvider {
    /// Create a new RPC provider.
    pub fn new(rpc_url: &str, contract: Felt, chunk_size: u64) -> anyhow::Result<Self> {
        let client = build_client()?;

        Ok(Self {
            client,
            rpc_url: rpc_url.to_string(),
            contract,
            chunk_size,
            request_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, StreamError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!("RPC call: {} {}", method, params);

        let response: RpcResponse<T> = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(error) = response.error {
            return Err(StreamError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        response
            .result
            .ok_or_else(|| StreamError::InvalidResponse(format!("{} returned no result", method)))
    }

    /// Latest accepted block number.
    pub async fn block_number(&self) -> Result<u64, StreamError> {
        self.call("starknet_blockNumber", json!([])).await
    }

    async fn block_header(&self, block_id: Value) -> Result<Option<BlockHeader>, StreamError> {
        match self
            .call("starknet_getBlockWithTxHashes", json!({ "block_id": block_id }))
            .await
        {
            Ok(header) => Ok(Some(header)),
            Err(StreamError::Rpc { code, .. }) if code == BLOCK_NOT_FOUND => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn events(&self, block_id: Value) -> Result<Vec<EmittedEvent>, StreamError> {
        let selectors: Vec<Felt> = EventKind::ALL.iter().map(|kind| kind.selector()).collect();
        let mut events = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut filter = json!({
                "from_block": block_id,
                "to_block": block_id,
                "address": self.contract,
                "keys": [selectors],
                "chunk_size": self.chunk_size,
            });
            if let Some(token) = &continuation_token {
                filter["continuation_token"] = json!(token);
            }

            let page: EventsPage = self
                .call("starknet_getEvents", json!({ "filter": filter }))
                .await?;
            events.extend(page.events);

            match page.continuation_token {
                Some(token) => continuation_token = Some(token),
                None => break,
            }
        }

        Ok(events)
    }
}

impl BlockSource for RpcProvider {
    async fn fetch_block(
        &mut self,
        number: u64,
        finality: Finality,
    ) -> Result<Option<Block>, StreamError> {
        let block_id = json!({ "block_number": number });
        if let Some(header) = self.block_header(block_id.clone()).await? {
            let block_finality = parse_status(header.status.as_deref())?;
            if !block_finality.satisfies(finality) {
                return Ok(None);
            }
            let events = self.events(block_id).await?;
            return assemble_block(number, block_finality, &header, events).map(Some);
        }

        if finality != Finality::Pending {
            return Ok(None);
        }

        // The pending block sits right after the latest accepted one.
        let latest = self.block_number().await?;
        if latest.checked_add(1) != Some(number) {
            return Ok(None);
        }

        let Some(header) = self.block_header(json!("pending")).await? else {
            return Ok(None);
        };
        let events = self.events(json!("pending")).await?;
        assemble_block(number, Finality::Pending, &header, events).map(Some)
    }

    async fn reconnect(&mut self) -> Result<(), StreamError> {
        info!("Reconnecting to RPC endpoint {}", self.rpc_url);
        self.client = build_client().map_err(|e| StreamError::Transport(e.to_string()))?;
        let latest = self.block_number().await?;
        info!("Reconnected, latest block {}", latest);
        Ok(())
    }
}

fn build_client() -> anyhow::Result<Client> {
    Ok(Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

fn parse_status(status: Option<&str>) -> Result<Finality, StreamError> {
    match status {
        Some("ACCEPTED_ON_L2") | Some("ACCEPTED_ON_L1") => Ok(Finality::Accepted),
        Some("PENDING") | None => Ok(Finality::Pending),
        Some(other) => Err(StreamError::InvalidResponse(format!(
            "Unexpected block status: {}",
            other
        ))),
    }
}

/// Build a block from its header and events in emission order.
///
/// The event index counts registry events within each transaction.
fn assemble_block(
    number: u64,
    finality: Finality,
    header: &BlockHeader,
    events: Vec<EmittedEvent>,
) -> Result<Block, StreamError> {
    if let Some(reported) = header.block_number {
        if reported != number {
            return Err(StreamError::UnexpectedBlock {
                expected: number,
                actual: reported,
            });
        }
    }

    let mut per_tx: HashMap<Felt, u64> = HashMap::new();
    let mut chain_events = Vec::with_capacity(events.len());
    for event in events {
        let Some((selector, keys)) = event.keys.split_first() else {
            return Err(StreamError::InvalidResponse(format!(
                "Event without keys in tx {}",
                event.transaction_hash
            )));
        };

        let index = per_tx.entry(event.transaction_hash).or_insert(0);
        let mut fields = keys.to_vec();
        fields.extend(event.data);

        chain_events.push(ChainEvent {
            selector: *selector,
            fields,
            block_number: number,
            tx_hash: event.transaction_hash,
            event_index: *index,
            timestamp: header.timestamp,
            finality,
        });
        *index += 1;
    }

    Ok(Block {
        number,
        hash: header.block_hash.unwrap_or(Felt::ZERO),
        parent_hash: header.parent_hash,
        timestamp: header.timestamp,
        finality,
        events: chain_events,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_JSON: &str = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "result": {
            "status": "ACCEPTED_ON_L2",
            "block_hash": "0x2a",
            "parent_hash": "0x29",
            "block_number": 812,
            "new_root": "0x1",
            "timestamp": 1700000812,
            "sequencer_address": "0x5",
            "transactions": ["0xaa", "0xbb"]
        }
    }"#;

    #[test]
    fn test_parse_block_header() {
        let response: RpcResponse<BlockHeader> = serde_json::from_str(BLOCK_JSON).unwrap();
        let header = response.result.unwrap();
        assert_eq!(header.block_hash, Some(Felt::from_u64(0x2a)));
        assert_eq!(header.parent_hash, Felt::from_u64(0x29));
        assert_eq!(header.block_number, Some(812));
        assert_eq!(
            parse_status(header.status.as_deref()).unwrap(),
            Finality::Accepted
        );
    }

    #[test]
    fn test_parse_rpc_error() {
        let json = r#"{"jsonrpc":"2.0","id":1,"error":{"code":24,"message":"Block not found"}}"#;
        let response: RpcResponse<BlockHeader> = serde_json::from_str(json).unwrap();
        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, BLOCK_NOT_FOUND);
    }

    #[test]
    fn test_parse_status() {
        assert_eq!(parse_status(Some("ACCEPTED_ON_L1")).unwrap(), Finality::Accepted);
        assert_eq!(parse_status(Some("PENDING")).unwrap(), Finality::Pending);
        assert_eq!(parse_status(None).unwrap(), Finality::Pending);
        assert!(parse_status(Some("REJECTED")).is_err());
    }

    #[test]
    fn test_assemble_block_indexes_events_per_transaction() {
        let selector = EventKind::MessageSent.selector();
        let page = format!(
            r#"{{
                "events": [
                    {{"from_address": "0x99", "keys": ["{sel}", "0x1"], "data": ["0x2", "0x0"], "transaction_hash": "0xaa", "block_number": 812, "block_hash": "0x2a"}},
                    {{"from_address": "0x99", "keys": ["{sel}"], "data": ["0x1", "0x3", "0x0"], "transaction_hash": "0xbb", "block_number": 812, "block_hash": "0x2a"}},
                    {{"from_address": "0x99", "keys": ["{sel}"], "data": ["0x1", "0x4", "0x0"], "transaction_hash": "0xaa", "block_number": 812, "block_hash": "0x2a"}}
                ]
            }}"#,
            sel = selector
        );
        let page: EventsPage = serde_json::from_str(&page).unwrap();
        assert!(page.continuation_token.is_none());

        let response: RpcResponse<BlockHeader> = serde_json::from_str(BLOCK_JSON).unwrap();
        let header = response.result.unwrap();
        let block = assemble_block(812, Finality::Accepted, &header, page.events).unwrap();

        assert_eq!(block.hash, Felt::from_u64(0x2a));
        assert_eq!(block.events.len(), 3);
        let positions: Vec<(Felt, u64)> = block
            .events
            .iter()
            .map(|e| (e.tx_hash, e.event_index))
            .collect();
        assert_eq!(
            positions,
            vec![
                (Felt::from_u64(0xaa), 0),
                (Felt::from_u64(0xbb), 0),
                (Felt::from_u64(0xaa), 1),
            ]
        );

        // Extra keys come before data.
        assert_eq!(
            block.events[0].fields,
            vec![Felt::from_u64(1), Felt::from_u64(2), Felt::ZERO]
        );
        assert_eq!(block.events[0].selector, selector);
        assert_eq!(block.events[0].timestamp, 1_700_000_812);
    }

    #[test]
    fn test_assemble_block_rejects_mismatched_number() {
        let response: RpcResponse<BlockHeader> = serde_json::from_str(BLOCK_JSON).unwrap();
        let header = response.result.unwrap();
        assert!(matches!(
            assemble_block(813, Finality::Accepted, &header, vec![]),
            Err(StreamError::UnexpectedBlock {
                expected: 813,
                actual: 812
            })
        ));
    }
}
