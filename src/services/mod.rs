//! Core services of the indexer.
//!
//! - `blockchain`: upstream transports, connection pool and chain reader
//! - `blocksync`: history backfill, live tail and mempool watching
//! - `bus`: topic based publish/subscribe
//! - `election`: leader election over the bus
//! - `notification`: publication of chain events for registered accounts
//! - `scheduler`: cron jobs
//! - `storage`: persistence gateway and the gated write path

pub mod blockchain;
pub mod blocksync;
pub mod bus;
pub mod election;
pub mod notification;
pub mod scheduler;
pub mod storage;
