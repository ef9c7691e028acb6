//! Domain models and data structures for chain indexing.
//!
//! This module contains all the core data structures used throughout the application:
//!
//! - `blockchain`: Blocks, transactions, logs and the raw JSON-RPC shapes they are read from
//! - `config`: Configuration loading and validation
//! - `core`: Endpoints, sync cursor, election state and engine events

mod blockchain;
mod config;
mod core;

// Re-export blockchain types
pub use blockchain::rpc;
pub use blockchain::{
	derive_log_id, Block, BlockRecord, Log, PendingBlock, Receipt, SyncStatus, Transaction,
	TRANSFER_GAS, UNCONFIRMED_BLOCK_NUMBER,
};

// Re-export core types
pub use core::{
	BlockRange, ChainEvent, ElectionState, Endpoint, RegisteredAccount, SyncCursor, TransportKind,
};

// Re-export config types
pub use config::{
	BackfillConfig, ConfigError, ConfigLoader, ElectionConfig, IndexerConfig, PoolConfig,
	TailConfig,
};
