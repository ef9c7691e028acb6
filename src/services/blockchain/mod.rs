//! Upstream chain access.
//!
//! Provides the connection pool, the chain reader and the transports they run on:
//!
//! - Network transport implementations (http, websocket, local socket)
//! - Connection pool with failover and periodic re-probing
//! - Chain reader normalizing node replies into the domain model
//! - Error handling for blockchain operations

mod error;
mod pool;
mod reader;
mod transports;

pub use error::BlockChainError;
pub use pool::{ActiveConnection, ConnectionPool};
pub use reader::{ChainReader, EvmChainReader};
pub use transports::{
	build_request, rpc_methods, BlockchainTransport, DefaultTransportFactory, DuplexTransport,
	HttpTransportClient, TransportError, TransportFactory, PENDING_TX_BUFFER, PROBE_METHOD,
};
