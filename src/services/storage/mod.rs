//! Persistence of blocks, transactions and logs.
//!
//! - `gateway`: the store interface the engines write through
//! - `memory`: in-process implementation of the gateway
//! - `writer`: leadership-gated, serialized write path

mod error;
mod gateway;
mod memory;
mod writer;

pub use error::StoreError;
pub use gateway::PersistenceGateway;
pub use memory::InMemoryStore;
pub use writer::{BlockWriter, WriteOutcome};
