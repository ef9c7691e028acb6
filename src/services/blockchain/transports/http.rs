//! HTTP JSON-RPC transport.
//!
//! HTTP has no connection state to watch, so `disconnect_signal` is `None` and the pool pings
//! the endpoint instead. Pending transactions are read by polling a node-side filter.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::{
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
	time::Duration,
};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::{
	models::TransportKind,
	services::blockchain::transports::{
		build_request, rpc_methods, BlockchainTransport, TransportError, PENDING_TX_BUFFER,
	},
};

/// JSON-RPC client for one HTTP endpoint
#[derive(Clone, Debug)]
pub struct HttpTransportClient {
	client: reqwest::Client,
	url: String,
	request_id: Arc<AtomicU64>,
	poll_interval: Duration,
}

impl HttpTransportClient {
	/// Creates a client for `url`
	///
	/// # Arguments
	/// * `client` - Shared reqwest client (connection pool, timeouts)
	/// * `url` - Endpoint URL
	/// * `poll_interval` - Period of `eth_getFilterChanges` polling for pending transactions
	pub fn new(client: reqwest::Client, url: &str, poll_interval: Duration) -> Self {
		Self {
			client,
			url: url.to_string(),
			request_id: Arc::new(AtomicU64::new(1)),
			poll_interval,
		}
	}

	fn next_id(&self) -> u64 {
		self.request_id.fetch_add(1, Ordering::Relaxed)
	}

	/// Returns the `result` of a request, turning a JSON-RPC `error` into a parse error.
	async fn request_result(
		&self,
		method: &str,
		params: Option<Value>,
	) -> Result<Value, TransportError> {
		let response = self.send_raw_request(method, params).await?;
		if let Some(error) = response.get("error") {
			return Err(TransportError::response_parse(
				format!("{} rejected: {}", method, error),
				None,
				None,
			));
		}
		Ok(response.get("result").cloned().unwrap_or(Value::Null))
	}

	/// Installs a pending transaction filter and returns its id.
	async fn install_filter(&self) -> Result<Value, TransportError> {
		let filter_id = self
			.request_result(rpc_methods::NEW_PENDING_TRANSACTION_FILTER, None)
			.await?;
		if filter_id.is_null() {
			return Err(TransportError::response_parse(
				"Node returned no pending transaction filter id",
				None,
				None,
			));
		}
		Ok(filter_id)
	}

	/// Polls the filter until the receiver is dropped.
	///
	/// Failed polls are retried on the next tick. A filter the node dropped is installed again.
	async fn poll_filter(self, mut filter_id: Value, sender: mpsc::Sender<String>) {
		'poll: loop {
			tokio::select! {
				_ = sender.closed() => break,
				_ = tokio::time::sleep(self.poll_interval) => {}
			}

			let response = match self
				.send_raw_request(rpc_methods::GET_FILTER_CHANGES, Some(json!([filter_id])))
				.await
			{
				Ok(response) => response,
				Err(e) => {
					debug!(endpoint = %self.url, error = %e, "Pending transaction filter poll failed");
					continue;
				}
			};

			if let Some(error) = response.get("error") {
				if is_missing_filter(error) {
					match self.install_filter().await {
						Ok(id) => {
							debug!(endpoint = %self.url, "Pending transaction filter reinstalled");
							filter_id = id;
						}
						Err(e) => {
							debug!(endpoint = %self.url, error = %e, "Failed to reinstall pending transaction filter");
						}
					}
				} else {
					debug!(endpoint = %self.url, error = %error, "Pending transaction filter poll rejected");
				}
				continue;
			}

			let hashes = response.get("result").and_then(Value::as_array);
			for hash in hashes.into_iter().flatten().filter_map(Value::as_str) {
				if sender.send(hash.to_string()).await.is_err() {
					break 'poll;
				}
			}
		}

		let _ = self
			.request_result(rpc_methods::UNINSTALL_FILTER, Some(json!([filter_id])))
			.await;
	}
}

/// Whether a JSON-RPC error says the filter id is unknown to the node
fn is_missing_filter(error: &Value) -> bool {
	error
		.get("message")
		.and_then(Value::as_str)
		.is_some_and(|message| message.to_lowercase().contains("filter not found"))
}

#[async_trait]
impl BlockchainTransport for HttpTransportClient {
	fn endpoint_uri(&self) -> &str {
		&self.url
	}

	fn transport_kind(&self) -> TransportKind {
		TransportKind::Http
	}

	async fn send_raw_request(
		&self,
		method: &str,
		params: Option<Value>,
	) -> Result<Value, TransportError> {
		let request_body = build_request(self.next_id(), method, params);

		let response = self
			.client
			.post(&self.url)
			.header("Content-Type", "application/json")
			.json(&request_body)
			.send()
			.await
			.map_err(|e| {
				TransportError::network(
					format!("Failed to send {} request", method),
					Some(Box::new(e)),
					None,
				)
			})?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(TransportError::http(
				status.as_u16(),
				self.url.clone(),
				body,
				None,
				None,
			));
		}

		let json_response: Value = response.json().await.map_err(|e| {
			TransportError::response_parse(
				format!("Failed to parse {} response", method),
				Some(Box::new(e)),
				None,
			)
		})?;

		Ok(json_response)
	}

	fn disconnect_signal(&self) -> Option<watch::Receiver<bool>> {
		None
	}

	async fn subscribe_pending_transactions(
		&self,
	) -> Result<mpsc::Receiver<String>, TransportError> {
		let filter_id = self.install_filter().await?;

		let (sender, receiver) = mpsc::channel(PENDING_TX_BUFFER);
		tokio::spawn(self.clone().poll_filter(filter_id, sender));
		Ok(receiver)
	}

	async fn close(&self) {}
}
