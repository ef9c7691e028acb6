//! Network transport implementations for blockchain clients.
//!
//! Provides the JSON-RPC transports the connection pool can hold:
//!
//! - HTTP: request/response only; liveness is checked by pinging and the mempool is polled
//!   through a pending transaction filter
//! - WebSocket and local socket: full duplex, with a disconnect signal and push subscriptions

mod duplex;
mod error;
mod http;
mod ipc;
mod ws;

use async_trait::async_trait;
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, watch};

use crate::models::{Endpoint, TransportKind};

pub use duplex::DuplexTransport;
pub use error::TransportError;
pub use http::HttpTransportClient;

/// Ethereum JSON-RPC method names
pub mod rpc_methods {
	/// Current head height, also used as the liveness probe
	pub const BLOCK_NUMBER: &str = "eth_blockNumber";
	pub const GET_BLOCK_BY_NUMBER: &str = "eth_getBlockByNumber";
	pub const GET_BLOCK_BY_HASH: &str = "eth_getBlockByHash";
	pub const GET_TRANSACTION_BY_HASH: &str = "eth_getTransactionByHash";
	pub const GET_TRANSACTION_RECEIPT: &str = "eth_getTransactionReceipt";
	pub const GET_LOGS: &str = "eth_getLogs";
	pub const SYNCING: &str = "eth_syncing";
	pub const SUBSCRIBE: &str = "eth_subscribe";
	pub const UNSUBSCRIBE: &str = "eth_unsubscribe";
	pub const NEW_PENDING_TRANSACTION_FILTER: &str = "eth_newPendingTransactionFilter";
	pub const GET_FILTER_CHANGES: &str = "eth_getFilterChanges";
	pub const UNINSTALL_FILTER: &str = "eth_uninstallFilter";
}

/// Method used to check that an endpoint answers
pub const PROBE_METHOD: &str = rpc_methods::BLOCK_NUMBER;

/// Capacity of the pending transaction hash channel handed out by a transport
pub const PENDING_TX_BUFFER: usize = 1024;

/// Builds a JSON-RPC 2.0 request body.
pub fn build_request(id: u64, method: &str, params: Option<Value>) -> Value {
	json!({
		"jsonrpc": "2.0",
		"id": id,
		"method": method,
		"params": params.unwrap_or_else(|| json!([])),
	})
}

/// A live JSON-RPC connection to one endpoint
#[async_trait]
pub trait BlockchainTransport: Send + Sync {
	/// URI of the endpoint this transport talks to
	fn endpoint_uri(&self) -> &str;

	fn transport_kind(&self) -> TransportKind;

	/// Sends a JSON-RPC request and returns the full reply envelope
	///
	/// # Arguments
	/// * `method` - The JSON-RPC method
	/// * `params` - Positional parameters, `[]` when `None`
	///
	/// # Returns
	/// * `Result<Value, TransportError>` - Reply containing either `result` or `error`
	async fn send_raw_request(
		&self,
		method: &str,
		params: Option<Value>,
	) -> Result<Value, TransportError>;

	/// Receiver that flips to `true` when the connection drops.
	///
	/// `None` for poll-only transports; the pool pings those instead.
	fn disconnect_signal(&self) -> Option<watch::Receiver<bool>>;

	/// Streams the hashes of transactions entering the node's mempool.
	async fn subscribe_pending_transactions(
		&self,
	) -> Result<mpsc::Receiver<String>, TransportError>;

	/// Releases the connection.
	async fn close(&self);
}

/// Opens transports for endpoints
#[async_trait]
pub trait TransportFactory: Send + Sync {
	async fn connect(
		&self,
		endpoint: &Endpoint,
	) -> Result<Arc<dyn BlockchainTransport>, TransportError>;
}

/// Opens the transport matching the endpoint's URI scheme
#[derive(Debug, Clone)]
pub struct DefaultTransportFactory {
	http_client: reqwest::Client,
	mempool_poll_interval: Duration,
}

impl DefaultTransportFactory {
	/// Creates a factory
	///
	/// # Arguments
	/// * `request_timeout` - Timeout applied to every HTTP request
	/// * `mempool_poll_interval` - Poll period of the HTTP pending transaction filter
	pub fn new(
		request_timeout: Duration,
		mempool_poll_interval: Duration,
	) -> Result<Self, TransportError> {
		let http_client = reqwest::Client::builder()
			.timeout(request_timeout)
			.build()
			.map_err(|e| {
				TransportError::network("Failed to build HTTP client", Some(Box::new(e)), None)
			})?;
		Ok(Self {
			http_client,
			mempool_poll_interval,
		})
	}
}

#[async_trait]
impl TransportFactory for DefaultTransportFactory {
	async fn connect(
		&self,
		endpoint: &Endpoint,
	) -> Result<Arc<dyn BlockchainTransport>, TransportError> {
		match endpoint.transport_kind {
			TransportKind::Http => Ok(Arc::new(HttpTransportClient::new(
				self.http_client.clone(),
				&endpoint.uri,
				self.mempool_poll_interval,
			))),
			TransportKind::WebSocket => Ok(Arc::new(ws::connect(&endpoint.uri).await?)),
			TransportKind::LocalSocket => Ok(Arc::new(ipc::connect(&endpoint.uri).await?)),
		}
	}
}
