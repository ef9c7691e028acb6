//! Transaction model.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::models::blockchain::{u256_decimal, Log};

/// Block number stored for transactions seen in the mempool but not yet mined
pub const UNCONFIRMED_BLOCK_NUMBER: i64 = -1;

/// Gas used by a plain value transfer with no contract execution
pub const TRANSFER_GAS: u64 = 21_000;

/// A normalized transaction.
///
/// Addresses and hashes are lowercase. `block_number` is [`UNCONFIRMED_BLOCK_NUMBER`] while the
/// transaction only exists in the mempool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
	pub hash: String,
	pub block_number: i64,
	pub index: Option<u64>,
	pub from: String,
	pub to: Option<String>,
	#[serde(with = "u256_decimal")]
	pub value: U256,
	#[serde(with = "u256_decimal")]
	pub gas: U256,
	#[serde(with = "u256_decimal")]
	pub gas_price: U256,
	#[serde(with = "u256_decimal")]
	pub gas_used: U256,
	pub nonce: u64,
	pub input: String,
	#[serde(default)]
	pub logs: Vec<Log>,
}

impl Transaction {
	pub fn is_unconfirmed(&self) -> bool {
		self.block_number < 0
	}

	/// The block number if the transaction is mined.
	pub fn confirmed_number(&self) -> Option<u64> {
		u64::try_from(self.block_number).ok()
	}

	/// Whether the transaction carries call data (contract call or deployment).
	pub fn has_input(&self) -> bool {
		let data = self.input.trim_start_matches("0x");
		!data.is_empty()
	}

	/// `gas_price * gas_used`, saturating on overflow.
	pub fn fee(&self) -> U256 {
		self.gas_price.saturating_mul(self.gas_used)
	}

	/// Unique addresses involved: `to`, `from` and, if `with_logs`, every log emitter.
	pub fn involved_addresses(&self, with_logs: bool) -> Vec<String> {
		let mut addresses: Vec<String> = Vec::new();
		let mut push = |address: &str| {
			if !address.is_empty() && !addresses.iter().any(|a| a == address) {
				addresses.push(address.to_string());
			}
		};
		if let Some(to) = &self.to {
			push(to);
		}
		push(&self.from);
		if with_logs {
			for log in &self.logs {
				push(&log.address);
			}
		}
		addresses
	}
}

/// The part of a transaction receipt the indexer consumes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
	pub transaction_hash: String,
	/// Block the transaction was mined in, when the node reports it
	pub block_hash: Option<String>,
	pub gas_used: U256,
	pub logs: Vec<Log>,
}
