//! Chain reader: typed access to upstream chain data.
//!
//! Every call goes through the pool's active connection. Failures are classified and returned;
//! retrying is left to the engines.

use alloy::primitives::U256;
use async_trait::async_trait;
use futures::{stream, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::broadcast, time::timeout};

use crate::{
	models::{
		rpc::{parse_u64_quantity, RpcBlock, RpcLog, RpcReceipt, RpcSyncStatus, RpcTransaction},
		Block, Log, PendingBlock, Receipt, SyncStatus, Transaction,
	},
	services::blockchain::{transports::rpc_methods, BlockChainError, ConnectionPool},
};

/// Concurrent receipt lookups per block
const RECEIPT_CONCURRENCY: usize = 16;

/// Read access to chain data in the normalized domain model
#[async_trait]
pub trait ChainReader: Send + Sync {
	/// Current head height of the upstream
	async fn height(&self) -> Result<u64, BlockChainError>;

	/// Sync progress of the upstream node, `None` when it is not syncing
	async fn sync_status(&self) -> Result<Option<SyncStatus>, BlockChainError>;

	/// Block at `number`, `None` if the upstream does not have it
	///
	/// # Arguments
	/// * `number` - Block height
	/// * `include_transactions` - Whether to fetch full transaction objects
	async fn block_by_number(
		&self,
		number: u64,
		include_transactions: bool,
	) -> Result<Option<Block>, BlockChainError>;

	/// Block with hash `hash`, `None` if the upstream discarded it
	async fn block_by_hash(
		&self,
		hash: &str,
		include_transactions: bool,
	) -> Result<Option<Block>, BlockChainError>;

	/// Receipts of `transactions`, in the same order
	async fn receipts_for(
		&self,
		transactions: &[Transaction],
	) -> Result<Vec<Receipt>, BlockChainError>;

	/// Logs emitted in the inclusive block range
	async fn logs_in_range(&self, from: u64, to: u64) -> Result<Vec<Log>, BlockChainError>;

	/// Logs of the block with hash `block_hash`, whichever fork it is on
	async fn logs_in_block(&self, block_hash: &str) -> Result<Vec<Log>, BlockChainError>;

	/// Transaction hashes of the upstream's pending block
	async fn pending_block(&self) -> Result<Option<PendingBlock>, BlockChainError>;

	async fn transaction_by_hash(&self, hash: &str)
		-> Result<Option<Transaction>, BlockChainError>;

	/// Hashes of transactions entering the upstream mempool
	fn pending_transactions(&self) -> broadcast::Receiver<String>;

	/// Fetches a block with transactions, receipt gas and logs attached.
	///
	/// Receipts are only requested for transactions with input data; plain transfers keep the
	/// fixed transfer cost. Logs are selected by block hash, and a receipt from another block
	/// yields `BlockChanged`, so every part belongs to the block fetched first.
	async fn fetch_block(&self, number: u64) -> Result<Option<Block>, BlockChainError> {
		let Some(mut block) = self.block_by_number(number, true).await? else {
			return Ok(None);
		};

		let with_input: Vec<Transaction> = block
			.transactions
			.iter()
			.filter(|tx| tx.has_input())
			.cloned()
			.collect();
		if !with_input.is_empty() {
			let receipts = self.receipts_for(&with_input).await?;
			if let Some(moved) = receipts.iter().find(|receipt| {
				receipt
					.block_hash
					.as_ref()
					.is_some_and(|hash| *hash != block.hash)
			}) {
				return Err(BlockChainError::block_changed(
					number,
					format!(
						"Receipt of {} belongs to another block than {}",
						moved.transaction_hash, block.hash
					),
					None,
					None,
				));
			}
			let gas_used: HashMap<String, U256> = receipts
				.into_iter()
				.map(|receipt| (receipt.transaction_hash, receipt.gas_used))
				.collect();
			for tx in block.transactions.iter_mut() {
				if let Some(gas) = gas_used.get(&tx.hash) {
					tx.gas_used = *gas;
				}
			}
		}

		let mut logs_by_tx: HashMap<String, Vec<Log>> = HashMap::new();
		for log in self.logs_in_block(&block.hash).await? {
			logs_by_tx
				.entry(log.transaction_hash.clone())
				.or_default()
				.push(log);
		}
		for tx in block.transactions.iter_mut() {
			if let Some(mut logs) = logs_by_tx.remove(&tx.hash) {
				logs.sort_by_key(|log| log.index);
				tx.logs = logs;
			}
		}

		block.refresh_total_fee();
		Ok(Some(block))
	}
}

/// JSON-RPC backed reader over a [`ConnectionPool`]
#[derive(Clone)]
pub struct EvmChainReader {
	pool: Arc<ConnectionPool>,
	rpc_timeout: Duration,
}

impl EvmChainReader {
	/// Creates a reader
	///
	/// # Arguments
	/// * `pool` - Pool providing the active connection
	/// * `rpc_timeout` - Upper bound on every request
	pub fn new(pool: Arc<ConnectionPool>, rpc_timeout: Duration) -> Self {
		Self { pool, rpc_timeout }
	}

	pub fn pool(&self) -> &Arc<ConnectionPool> {
		&self.pool
	}

	/// Sends a request on the active connection and returns its `result`.
	///
	/// Timeouts and transport failures are reported to the pool; a JSON-RPC `error` reply is not,
	/// since the endpoint answered.
	async fn call(&self, method: &str, params: Value) -> Result<Value, BlockChainError> {
		let connection = self.pool.get_active().await?;
		let reply = match timeout(
			self.rpc_timeout,
			connection.transport.send_raw_request(method, Some(params)),
		)
		.await
		{
			Ok(Ok(reply)) => reply,
			Ok(Err(e)) => {
				self.pool.report_failure(connection.generation).await;
				return Err(BlockChainError::connection_lost(
					connection.uri,
					format!("{} failed", method),
					Some(Box::new(e)),
					None,
				));
			}
			Err(_) => {
				self.pool.report_failure(connection.generation).await;
				return Err(BlockChainError::transient_rpc_timeout(
					connection.uri,
					method,
					None,
					None,
				));
			}
		};

		if let Some(error) = reply.get("error") {
			let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
			let message = error
				.get("message")
				.and_then(Value::as_str)
				.unwrap_or("unknown error");
			return Err(BlockChainError::rpc_error(
				code,
				format!("{} failed: {}", method, message),
				None,
				Some(HashMap::from([("endpoint".to_string(), connection.uri)])),
			));
		}
		Ok(reply.get("result").cloned().unwrap_or(Value::Null))
	}

	async fn call_typed<T: DeserializeOwned>(
		&self,
		method: &str,
		params: Value,
	) -> Result<Option<T>, BlockChainError> {
		let result = self.call(method, params).await?;
		if result.is_null() {
			return Ok(None);
		}
		serde_json::from_value(result).map(Some).map_err(|e| {
			BlockChainError::response_parse_error(
				format!("Unexpected {} reply", method),
				Some(Box::new(e)),
				None,
			)
		})
	}

	async fn receipt(&self, hash: &str) -> Result<Receipt, BlockChainError> {
		self.call_typed::<RpcReceipt>(rpc_methods::GET_TRANSACTION_RECEIPT, json!([hash]))
			.await?
			.map(RpcReceipt::into_receipt)
			.ok_or_else(|| {
				BlockChainError::response_parse_error(
					format!("Missing receipt for transaction {}", hash),
					None,
					None,
				)
			})
	}
}

#[async_trait]
impl ChainReader for EvmChainReader {
	async fn height(&self) -> Result<u64, BlockChainError> {
		let result = self.call(rpc_methods::BLOCK_NUMBER, json!([])).await?;
		parse_u64_quantity(&result).ok_or_else(|| {
			BlockChainError::response_parse_error(
				format!("Invalid block number: {}", result),
				None,
				None,
			)
		})
	}

	async fn sync_status(&self) -> Result<Option<SyncStatus>, BlockChainError> {
		let result = self.call(rpc_methods::SYNCING, json!([])).await?;
		RpcSyncStatus::from_value(result).map_err(|e| {
			BlockChainError::response_parse_error("Invalid eth_syncing reply", Some(Box::new(e)), None)
		})
	}

	async fn block_by_number(
		&self,
		number: u64,
		include_transactions: bool,
	) -> Result<Option<Block>, BlockChainError> {
		Ok(self
			.call_typed::<RpcBlock>(
				rpc_methods::GET_BLOCK_BY_NUMBER,
				json!([format!("0x{:x}", number), include_transactions]),
			)
			.await?
			.and_then(RpcBlock::into_block))
	}

	async fn block_by_hash(
		&self,
		hash: &str,
		include_transactions: bool,
	) -> Result<Option<Block>, BlockChainError> {
		Ok(self
			.call_typed::<RpcBlock>(
				rpc_methods::GET_BLOCK_BY_HASH,
				json!([hash, include_transactions]),
			)
			.await?
			.and_then(RpcBlock::into_block))
	}

	async fn receipts_for(
		&self,
		transactions: &[Transaction],
	) -> Result<Vec<Receipt>, BlockChainError> {
		let hashes: Vec<String> = transactions.iter().map(|tx| tx.hash.clone()).collect();
		stream::iter(hashes)
			.map(|hash| async move { self.receipt(&hash).await })
			.buffered(RECEIPT_CONCURRENCY)
			.try_collect()
			.await
	}

	async fn logs_in_range(&self, from: u64, to: u64) -> Result<Vec<Log>, BlockChainError> {
		let filter = json!([{
			"fromBlock": format!("0x{:x}", from),
			"toBlock": format!("0x{:x}", to),
		}]);
		Ok(self
			.call_typed::<Vec<RpcLog>>(rpc_methods::GET_LOGS, filter)
			.await?
			.unwrap_or_default()
			.into_iter()
			.filter_map(RpcLog::into_log)
			.collect())
	}

	async fn logs_in_block(&self, block_hash: &str) -> Result<Vec<Log>, BlockChainError> {
		Ok(self
			.call_typed::<Vec<RpcLog>>(rpc_methods::GET_LOGS, json!([{ "blockHash": block_hash }]))
			.await?
			.unwrap_or_default()
			.into_iter()
			.filter_map(RpcLog::into_log)
			.collect())
	}

	async fn pending_block(&self) -> Result<Option<PendingBlock>, BlockChainError> {
		Ok(self
			.call_typed::<RpcBlock>(rpc_methods::GET_BLOCK_BY_NUMBER, json!(["pending", false]))
			.await?
			.map(RpcBlock::into_pending_block))
	}

	async fn transaction_by_hash(
		&self,
		hash: &str,
	) -> Result<Option<Transaction>, BlockChainError> {
		Ok(self
			.call_typed::<RpcTransaction>(rpc_methods::GET_TRANSACTION_BY_HASH, json!([hash]))
			.await?
			.map(RpcTransaction::into_transaction))
	}

	fn pending_transactions(&self) -> broadcast::Receiver<String> {
		self.pool.subscribe_pending()
	}
}
