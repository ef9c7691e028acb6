//! Chain data models.
//!
//! - `block`, `transaction`, `log`: the normalized domain model that is persisted and published
//! - `rpc`: raw JSON-RPC reply shapes and their normalization into the domain model

mod block;
mod log;
pub mod rpc;
mod transaction;

pub use block::{Block, BlockRecord, PendingBlock, SyncStatus};
pub use log::{derive_log_id, Log};
pub use transaction::{Receipt, Transaction, TRANSFER_GAS, UNCONFIRMED_BLOCK_NUMBER};

/// Serializes big integers as decimal strings so JSON consumers never see a lossy float.
pub(crate) mod u256_decimal {
	use alloy::primitives::U256;
	use serde::{de::Error, Deserialize, Deserializer, Serializer};

	pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&value.to_string())
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
		let raw = String::deserialize(deserializer)?;
		U256::from_str_radix(&raw, 10).map_err(D::Error::custom)
	}
}
