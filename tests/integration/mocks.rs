//! Mock implementations and HTTP helpers shared by the integration tests.

use async_trait::async_trait;
use eth_blockprocessor::{
	models::{BlockRecord, ElectionState, Log, PoolConfig, Transaction},
	services::{
		bus::{BusError, BusSubscription, EventBus},
		storage::{PersistenceGateway, StoreError},
	},
};
use mockall::mock;
use mockito::{Matcher, Mock, ServerGuard};
use serde_json::{json, Value};
use tokio::sync::watch;

mock! {
	pub PersistenceGateway {}

	#[async_trait]
	impl PersistenceGateway for PersistenceGateway {
		async fn upsert_block(&self, block: &BlockRecord) -> Result<(), StoreError>;
		async fn upsert_transaction(&self, transaction: &Transaction) -> Result<(), StoreError>;
		async fn upsert_log(&self, log: &Log) -> Result<(), StoreError>;
		async fn delete_by_block_number(&self, number: u64) -> Result<(), StoreError>;
		async fn count_in_range(&self, from: u64, to: u64) -> Result<u64, StoreError>;
		async fn find_latest(&self, limit: usize) -> Result<Vec<BlockRecord>, StoreError>;
		async fn find_by_hash(&self, hash: &str) -> Result<Option<BlockRecord>, StoreError>;
		async fn find_by_number(&self, number: u64) -> Result<Option<BlockRecord>, StoreError>;
		async fn find_transaction(&self, hash: &str) -> Result<Option<Transaction>, StoreError>;
		async fn logs_for_transaction(&self, hash: &str) -> Result<Vec<Log>, StoreError>;
		async fn delete_unconfirmed_except(&self, keep: &[String]) -> Result<u64, StoreError>;
		async fn delete_all_unconfirmed(&self) -> Result<u64, StoreError>;
	}
}

mock! {
	pub EventBus {}

	#[async_trait]
	impl EventBus for EventBus {
		async fn publish(&self, topic: &str, payload: Value) -> Result<(), BusError>;
		async fn subscribe(&self, topic: &str) -> Result<BusSubscription, BusError>;
	}
}

pub fn store_down() -> StoreError {
	StoreError::store_unavailable("connection refused", None, None)
}

/// Election state of an instance that settled as leader or follower
pub fn leadership(is_leader: bool) -> (watch::Sender<ElectionState>, watch::Receiver<ElectionState>) {
	let mut state = ElectionState::new("self");
	state.observe_leader(if is_leader { "self" } else { "other" });
	state.synced = true;
	watch::channel(state)
}

/// Pool settings short enough for tests against local HTTP servers
pub fn fast_pool_config() -> PoolConfig {
	PoolConfig {
		probe_timeout_ms: 2_000,
		failure_cooldown_ms: 60_000,
		retry_delay_ms: 50,
		ping_interval_ms: 60_000,
		max_switch_attempts: 1,
		mempool_poll_interval_ms: 20,
		..PoolConfig::default()
	}
}

/// Mocks a JSON-RPC `result` reply for `method`
pub async fn mock_rpc_result(server: &mut ServerGuard, method: &str, result: Value) -> Mock {
	server
		.mock("POST", "/")
		.match_body(Matcher::PartialJson(json!({ "method": method })))
		.with_header("content-type", "application/json")
		.with_body(json!({ "jsonrpc": "2.0", "id": 1, "result": result }).to_string())
		.create_async()
		.await
}

/// Mocks a JSON-RPC `error` reply for `method`
pub async fn mock_rpc_error(server: &mut ServerGuard, method: &str, code: i64, message: &str) -> Mock {
	server
		.mock("POST", "/")
		.match_body(Matcher::PartialJson(json!({ "method": method })))
		.with_header("content-type", "application/json")
		.with_body(
			json!({
				"jsonrpc": "2.0",
				"id": 1,
				"error": { "code": code, "message": message }
			})
			.to_string(),
		)
		.create_async()
		.await
}

/// Block as returned by `eth_getBlockByNumber`
pub fn rpc_block(number: u64, transactions: Value) -> Value {
	json!({
		"hash": format!("0x{:064x}", number),
		"parentHash": format!("0x{:064x}", number.saturating_sub(1)),
		"number": format!("0x{:x}", number),
		"timestamp": "0x5f5e100",
		"uncles": [],
		"transactions": transactions,
	})
}
