//! Transaction log model.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A log emitted by a transaction.
///
/// The id is derived from the position of the log in the chain, so re-indexing the same block
/// always produces the same id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
	pub id: String,
	pub block_number: u64,
	pub transaction_hash: String,
	pub tx_index: u64,
	pub index: u64,
	pub removed: bool,
	/// First topic (event signature hash), if any
	pub signature: Option<String>,
	pub topics: Vec<String>,
	pub data: String,
	pub address: String,
}

impl Log {
	/// Splits `data` into 32-byte words (64 hex characters each).
	///
	/// Non-indexed event arguments are ABI encoded one per word, so this is the list of raw
	/// arguments that follow the indexed topics.
	pub fn data_words(&self) -> Vec<String> {
		let data = self.data.trim_start_matches("0x");
		data.as_bytes()
			.chunks(64)
			.map(|chunk| String::from_utf8_lossy(chunk).into_owned())
			.collect()
	}

	/// Position of the first data word in the combined `topics ++ data_words` argument list.
	pub fn data_index_start(&self) -> usize {
		self.topics.len()
	}
}

/// Derives the stable id of a log from its chain position.
///
/// # Arguments
/// * `block_number` - Block containing the log
/// * `tx_index` - Index of the transaction in the block
/// * `log_index` - Index of the log in the block
///
/// # Returns
/// * `String` - 32 hex characters
pub fn derive_log_id(block_number: u64, tx_index: u64, log_index: u64) -> String {
	let digest = Sha256::digest(format!("{}x{}x{}", block_number, tx_index, log_index));
	hex::encode(&digest[..16])
}
