//! Full duplex JSON-RPC over a message stream.
//!
//! Shared by the WebSocket and local socket transports. One task writes outgoing frames, another
//! reads incoming frames and routes them: replies by request id, `eth_subscription`
//! notifications by subscription id. When the stream ends the disconnect signal flips to `true`
//! and every in-flight request fails with [`TransportError::Closed`].

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc,
	},
};
use tokio::{
	sync::{mpsc, oneshot, watch, Mutex},
	task::JoinHandle,
};

use crate::{
	models::TransportKind,
	services::blockchain::transports::{
		build_request, rpc_methods, BlockchainTransport, TransportError, PENDING_TX_BUFFER,
	},
};

type PendingReplies = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;
type Subscriptions = Arc<Mutex<HashMap<String, mpsc::Sender<String>>>>;

const OUTBOUND_BUFFER: usize = 256;

/// JSON-RPC client over a bidirectional frame stream
pub struct DuplexTransport {
	uri: String,
	kind: TransportKind,
	outbound: mpsc::Sender<String>,
	pending: PendingReplies,
	subscriptions: Subscriptions,
	closed: watch::Receiver<bool>,
	closed_tx: Arc<watch::Sender<bool>>,
	request_id: AtomicU64,
	tasks: Vec<JoinHandle<()>>,
}

impl DuplexTransport {
	/// Starts the reader and writer tasks over `sink` and `stream`
	///
	/// # Arguments
	/// * `uri` - Endpoint URI, for logs
	/// * `kind` - Transport kind reported to the pool
	/// * `sink` - Outgoing text frames
	/// * `stream` - Incoming text frames; the end of the stream means disconnection
	pub fn spawn<Si, St>(uri: &str, kind: TransportKind, sink: Si, stream: St) -> Self
	where
		Si: Sink<String, Error = TransportError> + Send + 'static,
		St: Stream<Item = Result<String, TransportError>> + Send + 'static,
	{
		let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_BUFFER);
		let (closed_tx, closed) = watch::channel(false);
		let closed_tx = Arc::new(closed_tx);
		let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
		let subscriptions: Subscriptions = Arc::new(Mutex::new(HashMap::new()));

		let writer = tokio::spawn(write_frames(
			uri.to_string(),
			sink,
			outbound_rx,
			closed_tx.clone(),
		));
		let reader = tokio::spawn(read_frames(
			uri.to_string(),
			stream,
			pending.clone(),
			subscriptions.clone(),
			closed_tx.clone(),
		));

		Self {
			uri: uri.to_string(),
			kind,
			outbound,
			pending,
			subscriptions,
			closed,
			closed_tx,
			request_id: AtomicU64::new(1),
			tasks: vec![writer, reader],
		}
	}

	fn closed_error(&self, method: &str) -> TransportError {
		TransportError::closed(
			format!("Connection to {} closed during {}", self.uri, method),
			None,
			None,
		)
	}
}

async fn write_frames<Si>(
	uri: String,
	sink: Si,
	mut outbound: mpsc::Receiver<String>,
	closed_tx: Arc<watch::Sender<bool>>,
) where
	Si: Sink<String, Error = TransportError> + Send + 'static,
{
	let mut sink = Box::pin(sink);
	while let Some(frame) = outbound.recv().await {
		if let Err(e) = sink.send(frame).await {
			tracing::warn!(endpoint = %uri, error = %e, "Failed to write frame");
			break;
		}
	}
	closed_tx.send_replace(true);
}

async fn read_frames<St>(
	uri: String,
	stream: St,
	pending: PendingReplies,
	subscriptions: Subscriptions,
	closed_tx: Arc<watch::Sender<bool>>,
) where
	St: Stream<Item = Result<String, TransportError>> + Send + 'static,
{
	let mut stream = Box::pin(stream);
	while let Some(frame) = stream.next().await {
		let text = match frame {
			Ok(text) => text,
			Err(e) => {
				tracing::warn!(endpoint = %uri, error = %e, "Connection stream failed");
				break;
			}
		};
		let message: Value = match serde_json::from_str(&text) {
			Ok(message) => message,
			Err(e) => {
				tracing::debug!(endpoint = %uri, error = %e, "Ignoring malformed frame");
				continue;
			}
		};
		route_message(message, &pending, &subscriptions).await;
	}

	tracing::debug!(endpoint = %uri, "Connection stream ended");
	closed_tx.send_replace(true);
	// Dropping the reply senders fails every in-flight request.
	pending.lock().await.clear();
	subscriptions.lock().await.clear();
}

async fn route_message(message: Value, pending: &PendingReplies, subscriptions: &Subscriptions) {
	if let Some(id) = message.get("id").and_then(Value::as_u64) {
		if let Some(reply) = pending.lock().await.remove(&id) {
			let _ = reply.send(message);
		}
		return;
	}

	if message.get("method").and_then(Value::as_str) != Some("eth_subscription") {
		return;
	}
	let params = &message["params"];
	let (Some(subscription), Some(hash)) = (
		params.get("subscription").and_then(Value::as_str),
		params.get("result").and_then(Value::as_str),
	) else {
		return;
	};

	let mut subscriptions = subscriptions.lock().await;
	if let Some(sender) = subscriptions.get(subscription) {
		match sender.try_send(hash.to_string()) {
			Ok(()) => {}
			Err(mpsc::error::TrySendError::Full(_)) => {
				tracing::debug!(subscription, "Pending transaction queue full, dropping hash");
			}
			Err(mpsc::error::TrySendError::Closed(_)) => {
				subscriptions.remove(subscription);
			}
		}
	}
}

#[async_trait]
impl BlockchainTransport for DuplexTransport {
	fn endpoint_uri(&self) -> &str {
		&self.uri
	}

	fn transport_kind(&self) -> TransportKind {
		self.kind
	}

	async fn send_raw_request(
		&self,
		method: &str,
		params: Option<Value>,
	) -> Result<Value, TransportError> {
		if *self.closed.borrow() {
			return Err(self.closed_error(method));
		}

		let id = self.request_id.fetch_add(1, Ordering::Relaxed);
		let (reply_tx, reply_rx) = oneshot::channel();
		self.pending.lock().await.insert(id, reply_tx);

		let frame = build_request(id, method, params).to_string();
		if self.outbound.send(frame).await.is_err() {
			self.pending.lock().await.remove(&id);
			return Err(self.closed_error(method));
		}

		reply_rx.await.map_err(|_| self.closed_error(method))
	}

	fn disconnect_signal(&self) -> Option<watch::Receiver<bool>> {
		Some(self.closed.clone())
	}

	async fn subscribe_pending_transactions(
		&self,
	) -> Result<mpsc::Receiver<String>, TransportError> {
		let reply = self
			.send_raw_request(rpc_methods::SUBSCRIBE, Some(json!(["newPendingTransactions"])))
			.await?;
		let subscription = reply
			.get("result")
			.and_then(Value::as_str)
			.ok_or_else(|| {
				TransportError::response_parse(
					format!("Subscription rejected by {}: {}", self.uri, reply),
					None,
					None,
				)
			})?
			.to_string();

		let (sender, receiver) = mpsc::channel(PENDING_TX_BUFFER);
		self.subscriptions.lock().await.insert(subscription, sender);
		Ok(receiver)
	}

	async fn close(&self) {
		for task in &self.tasks {
			task.abort();
		}
		self.closed_tx.send_replace(true);
		self.pending.lock().await.clear();
		self.subscriptions.lock().await.clear();
	}
}

impl Drop for DuplexTransport {
	fn drop(&mut self) {
		for task in &self.tasks {
			task.abort();
		}
	}
}
