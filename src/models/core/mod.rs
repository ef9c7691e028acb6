//! Core domain models for the indexer.
//!
//! - `endpoint`: configured upstream node endpoints
//! - `cursor`: the live tail position and reorg detection window
//! - `election`: leader election state
//! - `event`: notifications emitted by the sync engines
//! - `account`: accounts whose transactions are published

mod account;
mod cursor;
mod election;
mod endpoint;
mod event;

pub use account::RegisteredAccount;
pub use cursor::{BlockRange, SyncCursor};
pub use election::ElectionState;
pub use endpoint::{Endpoint, TransportKind};
pub use event::ChainEvent;
