//! Block model.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::models::blockchain::{u256_decimal, Transaction};

/// A normalized block with its transactions in block order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
	pub hash: String,
	pub parent_hash: String,
	pub number: u64,
	pub timestamp: u64,
	pub uncle_count: u32,
	#[serde(with = "u256_decimal")]
	pub total_fee: U256,
	pub transactions: Vec<Transaction>,
}

impl Block {
	/// Recomputes `total_fee` as the sum of the transaction fees.
	pub fn refresh_total_fee(&mut self) {
		self.total_fee = self
			.transactions
			.iter()
			.fold(U256::ZERO, |acc, tx| acc.saturating_add(tx.fee()));
	}

	/// The row persisted for this block.
	pub fn record(&self) -> BlockRecord {
		BlockRecord {
			hash: self.hash.clone(),
			number: self.number,
			timestamp: self.timestamp,
			uncle_count: self.uncle_count,
			total_fee: self.total_fee,
			tx_count: self.transactions.len(),
		}
	}
}

/// Persisted block row.
///
/// `tx_count` always equals the number of transactions the block was written with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRecord {
	pub hash: String,
	pub number: u64,
	pub timestamp: u64,
	pub uncle_count: u32,
	#[serde(with = "u256_decimal")]
	pub total_fee: U256,
	pub tx_count: usize,
}

/// Transaction hashes of the upstream's pending block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingBlock {
	pub transactions: Vec<String>,
}

/// Upstream sync progress as reported by `eth_syncing`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
	pub starting_block: u64,
	pub current_block: u64,
	pub highest_block: u64,
}

impl SyncStatus {
	/// The node reports syncing but has not imported anything yet.
	pub fn not_started(&self) -> bool {
		self.current_block == 0
	}
}
