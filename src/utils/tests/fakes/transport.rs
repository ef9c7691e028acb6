//! Fake upstream node and transport.
//!
//! A [`FakeNode`] answers `eth_blockNumber` from its height and any other method from canned
//! replies. Taking it down makes every request fail and fires the disconnect signal of duplex
//! transports.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::{
	collections::HashMap,
	sync::{
		atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
		Arc, Mutex,
	},
};
use tokio::sync::{broadcast, mpsc, watch};

use crate::{
	models::{Endpoint, TransportKind},
	services::blockchain::{
		rpc_methods, BlockchainTransport, TransportError, TransportFactory, PENDING_TX_BUFFER,
	},
};

enum CannedReply {
	Result(Value),
	Error { code: i64, message: String },
}

struct FakeNodeState {
	reachable: AtomicBool,
	height: AtomicU64,
	connects: AtomicUsize,
	requests: AtomicUsize,
	replies: Mutex<HashMap<String, CannedReply>>,
	disconnect: watch::Sender<bool>,
	pending: broadcast::Sender<String>,
	pending_end: watch::Sender<bool>,
	stall_subscriptions: AtomicBool,
}

/// Shared handle to a fake upstream node
#[derive(Clone)]
pub struct FakeNode {
	state: Arc<FakeNodeState>,
}

impl FakeNode {
	/// A reachable node at `height`
	pub fn new(height: u64) -> Self {
		let (disconnect, _) = watch::channel(false);
		let (pending, _) = broadcast::channel(PENDING_TX_BUFFER);
		let (pending_end, _) = watch::channel(false);
		Self {
			state: Arc::new(FakeNodeState {
				reachable: AtomicBool::new(true),
				height: AtomicU64::new(height),
				connects: AtomicUsize::new(0),
				requests: AtomicUsize::new(0),
				replies: Mutex::new(HashMap::new()),
				disconnect,
				pending,
				pending_end,
				stall_subscriptions: AtomicBool::new(false),
			}),
		}
	}

	pub fn unreachable() -> Self {
		let node = Self::new(0);
		node.state.reachable.store(false, Ordering::SeqCst);
		node
	}

	pub fn set_height(&self, height: u64) {
		self.state.height.store(height, Ordering::SeqCst);
	}

	/// Answers `method` with `result`
	pub fn respond(&self, method: &str, result: Value) {
		self.state
			.replies
			.lock()
			.unwrap()
			.insert(method.to_string(), CannedReply::Result(result));
	}

	/// Answers `method` with a JSON-RPC error object
	pub fn fail(&self, method: &str, code: i64, message: &str) {
		self.state.replies.lock().unwrap().insert(
			method.to_string(),
			CannedReply::Error {
				code,
				message: message.to_string(),
			},
		);
	}

	pub fn go_down(&self) {
		self.state.reachable.store(false, Ordering::SeqCst);
		self.state.disconnect.send_replace(true);
	}

	pub fn come_up(&self) {
		self.state.reachable.store(true, Ordering::SeqCst);
		self.state.disconnect.send_replace(false);
	}

	/// Announces a pending transaction hash to subscribed transports
	pub fn push_pending(&self, hash: &str) {
		let _ = self.state.pending.send(hash.to_string());
	}

	/// Ends every open pending transaction stream while the node stays reachable
	pub fn end_pending_streams(&self) {
		self.state.pending_end.send_replace(true);
	}

	/// Leaves pending transaction subscriptions unanswered
	pub fn stall_subscriptions(&self) {
		self.state.stall_subscriptions.store(true, Ordering::SeqCst);
	}

	/// Connection attempts, including failed ones
	pub fn connect_count(&self) -> usize {
		self.state.connects.load(Ordering::SeqCst)
	}

	pub fn request_count(&self) -> usize {
		self.state.requests.load(Ordering::SeqCst)
	}

	fn is_reachable(&self) -> bool {
		self.state.reachable.load(Ordering::SeqCst)
	}

	fn answer(&self, method: &str) -> Value {
		let replies = self.state.replies.lock().unwrap();
		match replies.get(method) {
			Some(CannedReply::Result(result)) => {
				json!({"jsonrpc": "2.0", "id": 1, "result": result})
			}
			Some(CannedReply::Error { code, message }) => {
				json!({"jsonrpc": "2.0", "id": 1, "error": {"code": code, "message": message}})
			}
			None if method == rpc_methods::BLOCK_NUMBER => json!({
				"jsonrpc": "2.0",
				"id": 1,
				"result": format!("0x{:x}", self.state.height.load(Ordering::SeqCst)),
			}),
			None => json!({
				"jsonrpc": "2.0",
				"id": 1,
				"error": {"code": -32601, "message": format!("the method {} does not exist", method)},
			}),
		}
	}
}

/// Transport connected to a [`FakeNode`]. The kind follows the endpoint URI, so `http://`
/// endpoints have no disconnect signal.
pub struct FakeTransport {
	uri: String,
	kind: TransportKind,
	node: FakeNode,
	closed: AtomicBool,
}

impl FakeTransport {
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}
}

#[async_trait]
impl BlockchainTransport for FakeTransport {
	fn endpoint_uri(&self) -> &str {
		&self.uri
	}

	fn transport_kind(&self) -> TransportKind {
		self.kind
	}

	async fn send_raw_request(
		&self,
		method: &str,
		_params: Option<Value>,
	) -> Result<Value, TransportError> {
		self.node.state.requests.fetch_add(1, Ordering::SeqCst);
		if self.is_closed() || !self.node.is_reachable() {
			return Err(TransportError::network(
				format!("{} is unreachable", self.uri),
				None,
				None,
			));
		}
		Ok(self.node.answer(method))
	}

	fn disconnect_signal(&self) -> Option<watch::Receiver<bool>> {
		self.kind
			.has_disconnect_signal()
			.then(|| self.node.state.disconnect.subscribe())
	}

	async fn subscribe_pending_transactions(
		&self,
	) -> Result<mpsc::Receiver<String>, TransportError> {
		if self.node.state.stall_subscriptions.load(Ordering::SeqCst) {
			std::future::pending::<()>().await;
		}
		let mut source = self.node.state.pending.subscribe();
		let mut ended = self.node.state.pending_end.subscribe();
		let (sender, receiver) = mpsc::channel(PENDING_TX_BUFFER);
		tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = async { let _ = ended.wait_for(|ended| *ended).await; } => break,
					hash = source.recv() => match hash {
						Ok(hash) => {
							if sender.send(hash).await.is_err() {
								break;
							}
						}
						Err(_) => break,
					},
				}
			}
		});
		Ok(receiver)
	}

	async fn close(&self) {
		self.closed.store(true, Ordering::SeqCst);
	}
}

/// Factory handing out [`FakeTransport`]s for registered nodes
#[derive(Clone, Default)]
pub struct FakeTransportFactory {
	nodes: Arc<Mutex<HashMap<String, FakeNode>>>,
}

impl FakeTransportFactory {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers the node served at `uri`
	pub fn with_node(self, uri: &str, node: FakeNode) -> Self {
		self.nodes.lock().unwrap().insert(uri.to_string(), node);
		self
	}
}

#[async_trait]
impl TransportFactory for FakeTransportFactory {
	async fn connect(
		&self,
		endpoint: &Endpoint,
	) -> Result<Arc<dyn BlockchainTransport>, TransportError> {
		let node = self.nodes.lock().unwrap().get(&endpoint.uri).cloned();
		let Some(node) = node else {
			return Err(TransportError::network(
				format!("No fake node at {}", endpoint.uri),
				None,
				None,
			));
		};
		node.state.connects.fetch_add(1, Ordering::SeqCst);
		if !node.is_reachable() {
			return Err(TransportError::network(
				format!("Connection to {} refused", endpoint.uri),
				None,
				None,
			));
		}
		Ok(Arc::new(FakeTransport {
			uri: endpoint.uri.clone(),
			kind: endpoint.transport_kind,
			node,
			closed: AtomicBool::new(false),
		}))
	}
}
