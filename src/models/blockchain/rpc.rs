//! Raw JSON-RPC reply shapes and their normalization into the domain model.
//!
//! Note: These structures follow the Ethereum JSON-RPC specification:
//! <https://ethereum.org/en/developers/docs/apis/json-rpc/>

use alloy::primitives::U256;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::models::blockchain::{
	derive_log_id, Block, Log, PendingBlock, Receipt, SyncStatus, Transaction, TRANSFER_GAS,
	UNCONFIRMED_BLOCK_NUMBER,
};

/// Parses a JSON-RPC quantity (`"0x1a"`), also accepting plain JSON numbers.
pub fn parse_u64_quantity(value: &Value) -> Option<u64> {
	match value {
		Value::String(s) => {
			let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
			if digits.is_empty() {
				return Some(0);
			}
			u64::from_str_radix(digits, 16).ok()
		}
		Value::Number(n) => n.as_u64(),
		_ => None,
	}
}

fn parse_u256_quantity(value: &Value) -> Option<U256> {
	match value {
		Value::String(s) => {
			let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))?;
			if digits.is_empty() {
				return Some(U256::ZERO);
			}
			U256::from_str_radix(digits, 16).ok()
		}
		Value::Number(n) => n.as_u64().map(U256::from),
		_ => None,
	}
}

mod quantity {
	use super::*;
	use serde::de::Error;

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
		let value = Value::deserialize(deserializer)?;
		parse_u64_quantity(&value)
			.ok_or_else(|| D::Error::custom(format!("invalid quantity: {}", value)))
	}
}

mod opt_quantity {
	use super::*;
	use serde::de::Error;

	pub fn deserialize<'de, D: Deserializer<'de>>(
		deserializer: D,
	) -> Result<Option<u64>, D::Error> {
		match Option::<Value>::deserialize(deserializer)? {
			None | Some(Value::Null) => Ok(None),
			Some(value) => parse_u64_quantity(&value)
				.map(Some)
				.ok_or_else(|| D::Error::custom(format!("invalid quantity: {}", value))),
		}
	}
}

mod big_quantity {
	use super::*;
	use serde::de::Error;

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
		match Option::<Value>::deserialize(deserializer)? {
			None | Some(Value::Null) => Ok(U256::ZERO),
			Some(value) => parse_u256_quantity(&value)
				.ok_or_else(|| D::Error::custom(format!("invalid quantity: {}", value))),
		}
	}
}

/// `eth_getBlockByNumber` / `eth_getBlockByHash` reply.
///
/// `hash` and `number` are null for the pending block.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
	pub hash: Option<String>,
	#[serde(default)]
	pub parent_hash: String,
	#[serde(default, with = "opt_quantity")]
	pub number: Option<u64>,
	#[serde(default, with = "opt_quantity")]
	pub timestamp: Option<u64>,
	#[serde(default)]
	pub uncles: Vec<String>,
	#[serde(default)]
	pub transactions: Vec<RpcBlockTransaction>,
}

/// Block transaction entry: a full object or a bare hash depending on the request flag
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RpcBlockTransaction {
	Hash(String),
	Full(Box<RpcTransaction>),
}

impl RpcBlockTransaction {
	pub fn hash(&self) -> &str {
		match self {
			RpcBlockTransaction::Hash(hash) => hash,
			RpcBlockTransaction::Full(tx) => &tx.hash,
		}
	}
}

/// `eth_getTransactionByHash` reply and full block transaction entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
	pub hash: String,
	#[serde(default, with = "opt_quantity")]
	pub block_number: Option<u64>,
	#[serde(default, with = "opt_quantity")]
	pub transaction_index: Option<u64>,
	pub from: String,
	#[serde(default)]
	pub to: Option<String>,
	#[serde(default, with = "big_quantity")]
	pub value: U256,
	#[serde(default, with = "big_quantity")]
	pub gas: U256,
	#[serde(default, with = "big_quantity")]
	pub gas_price: U256,
	#[serde(with = "quantity")]
	pub nonce: u64,
	#[serde(default)]
	pub input: String,
}

/// `eth_getTransactionReceipt` reply
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcReceipt {
	pub transaction_hash: String,
	#[serde(default)]
	pub block_hash: Option<String>,
	#[serde(default, with = "big_quantity")]
	pub gas_used: U256,
	#[serde(default)]
	pub logs: Vec<RpcLog>,
}

/// `eth_getLogs` entry
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcLog {
	pub address: String,
	#[serde(default)]
	pub topics: Vec<String>,
	#[serde(default)]
	pub data: String,
	#[serde(default, with = "opt_quantity")]
	pub block_number: Option<u64>,
	#[serde(default)]
	pub transaction_hash: Option<String>,
	#[serde(default, with = "opt_quantity")]
	pub transaction_index: Option<u64>,
	#[serde(default, with = "opt_quantity")]
	pub log_index: Option<u64>,
	#[serde(default)]
	pub removed: bool,
}

/// `eth_syncing` object reply (the node answers `false` when it is not syncing)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcSyncStatus {
	#[serde(default, with = "opt_quantity")]
	pub starting_block: Option<u64>,
	#[serde(default, with = "opt_quantity")]
	pub current_block: Option<u64>,
	#[serde(default, with = "opt_quantity")]
	pub highest_block: Option<u64>,
}

impl RpcTransaction {
	/// Normalizes the transaction. `gas_used` starts at the transfer cost; callers replace it
	/// with the receipt value for transactions that carry input data.
	pub fn into_transaction(self) -> Transaction {
		Transaction {
			hash: self.hash.to_lowercase(),
			block_number: self
				.block_number
				.and_then(|n| i64::try_from(n).ok())
				.unwrap_or(UNCONFIRMED_BLOCK_NUMBER),
			index: self.transaction_index,
			from: self.from.to_lowercase(),
			to: self.to.map(|to| to.to_lowercase()),
			value: self.value,
			gas: self.gas,
			gas_price: self.gas_price,
			gas_used: U256::from(TRANSFER_GAS),
			nonce: self.nonce,
			input: if self.input.is_empty() {
				"0x".to_string()
			} else {
				self.input
			},
			logs: Vec::new(),
		}
	}
}

impl RpcLog {
	/// Normalizes the log. Returns `None` for logs of a pending block, which have no position.
	pub fn into_log(self) -> Option<Log> {
		let block_number = self.block_number?;
		let tx_index = self.transaction_index?;
		let index = self.log_index?;
		Some(Log {
			id: derive_log_id(block_number, tx_index, index),
			block_number,
			transaction_hash: self.transaction_hash?.to_lowercase(),
			tx_index,
			index,
			removed: self.removed,
			signature: self.topics.first().cloned(),
			topics: self.topics,
			data: self.data,
			address: self.address.to_lowercase(),
		})
	}
}

impl RpcReceipt {
	pub fn into_receipt(self) -> Receipt {
		Receipt {
			transaction_hash: self.transaction_hash.to_lowercase(),
			block_hash: self.block_hash.map(|hash| hash.to_lowercase()),
			gas_used: self.gas_used,
			logs: self.logs.into_iter().filter_map(RpcLog::into_log).collect(),
		}
	}
}

impl RpcBlock {
	/// Normalizes a mined block. Transactions given as bare hashes are dropped; request the
	/// block with full transactions to keep them. Returns `None` for the pending block.
	pub fn into_block(self) -> Option<Block> {
		let hash = self.hash?.to_lowercase();
		let number = self.number?;
		let transactions = self
			.transactions
			.into_iter()
			.filter_map(|entry| match entry {
				RpcBlockTransaction::Full(tx) => Some(tx.into_transaction()),
				RpcBlockTransaction::Hash(_) => None,
			})
			.collect();
		let mut block = Block {
			hash,
			parent_hash: self.parent_hash.to_lowercase(),
			number,
			timestamp: self.timestamp.unwrap_or_default(),
			uncle_count: self.uncles.len() as u32,
			total_fee: U256::ZERO,
			transactions,
		};
		block.refresh_total_fee();
		Some(block)
	}

	/// Transaction hashes of the block, whichever form the reply used.
	pub fn into_pending_block(self) -> PendingBlock {
		PendingBlock {
			transactions: self
				.transactions
				.iter()
				.map(|entry| entry.hash().to_lowercase())
				.collect(),
		}
	}
}

impl RpcSyncStatus {
	/// Parses an `eth_syncing` reply.
	pub fn from_value(value: Value) -> Result<Option<SyncStatus>, serde_json::Error> {
		if matches!(value, Value::Bool(false) | Value::Null) {
			return Ok(None);
		}
		let raw: RpcSyncStatus = serde_json::from_value(value)?;
		Ok(Some(SyncStatus {
			starting_block: raw.starting_block.unwrap_or_default(),
			current_block: raw.current_block.unwrap_or_default(),
			highest_block: raw.highest_block.unwrap_or_default(),
		}))
	}
}
