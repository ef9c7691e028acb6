use eth_blockprocessor::{
	models::{Endpoint, TransportKind},
	services::blockchain::{
		rpc_methods, BlockchainTransport, DefaultTransportFactory, HttpTransportClient,
		TransportError, TransportFactory,
	},
};
use mockito::{Matcher, Server};
use serde_json::json;
use std::time::Duration;

use crate::integration::mocks::mock_rpc_result;

fn client_for(url: &str) -> HttpTransportClient {
	HttpTransportClient::new(reqwest::Client::new(), url, Duration::from_millis(20))
}

#[tokio::test]
async fn test_send_raw_request_returns_reply_envelope() {
	let mut server = Server::new_async().await;
	let mock = server
		.mock("POST", "/")
		.match_header("content-type", "application/json")
		.match_body(Matcher::PartialJson(json!({
			"jsonrpc": "2.0",
			"method": "eth_blockNumber"
		})))
		.with_header("content-type", "application/json")
		.with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x2a"}"#)
		.create_async()
		.await;

	let transport = client_for(&server.url());
	let reply = transport
		.send_raw_request(rpc_methods::BLOCK_NUMBER, None)
		.await
		.unwrap();

	assert_eq!(reply["result"], json!("0x2a"));
	mock.assert_async().await;
}

#[tokio::test]
async fn test_rpc_error_reply_is_returned_as_is() {
	let mut server = Server::new_async().await;
	let mock = server
		.mock("POST", "/")
		.with_header("content-type", "application/json")
		.with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"no such method"}}"#)
		.create_async()
		.await;

	let transport = client_for(&server.url());
	let reply = transport
		.send_raw_request("eth_unknown", Some(json!([])))
		.await
		.unwrap();

	assert_eq!(reply["error"]["code"], json!(-32601));
	mock.assert_async().await;
}

#[tokio::test]
async fn test_http_error_status() {
	let mut server = Server::new_async().await;
	let mock = server
		.mock("POST", "/")
		.with_status(503)
		.with_body("service unavailable")
		.create_async()
		.await;

	let transport = client_for(&server.url());
	let result = transport
		.send_raw_request(rpc_methods::BLOCK_NUMBER, None)
		.await;

	match result {
		Err(TransportError::Http {
			status_code, body, ..
		}) => {
			assert_eq!(status_code, 503);
			assert_eq!(body, "service unavailable");
		}
		other => panic!("expected an HTTP error, got {:?}", other),
	}
	mock.assert_async().await;
}

#[tokio::test]
async fn test_invalid_json_reply() {
	let mut server = Server::new_async().await;
	let _mock = server
		.mock("POST", "/")
		.with_header("content-type", "application/json")
		.with_body("not json")
		.create_async()
		.await;

	let transport = client_for(&server.url());
	let result = transport
		.send_raw_request(rpc_methods::BLOCK_NUMBER, None)
		.await;

	assert!(matches!(result, Err(TransportError::ResponseParse(_))));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_network_error() {
	let transport = client_for("http://127.0.0.1:1");
	let result = transport
		.send_raw_request(rpc_methods::BLOCK_NUMBER, None)
		.await;

	assert!(matches!(result, Err(TransportError::Network(_))));
}

#[tokio::test]
async fn test_pending_transactions_are_polled_from_filter() {
	let mut server = Server::new_async().await;
	let filter = mock_rpc_result(
		&mut server,
		rpc_methods::NEW_PENDING_TRANSACTION_FILTER,
		json!("0x1"),
	)
	.await;
	let _changes = mock_rpc_result(
		&mut server,
		rpc_methods::GET_FILTER_CHANGES,
		json!(["0xaa", "0xbb"]),
	)
	.await;

	let transport = client_for(&server.url());
	let mut hashes = transport.subscribe_pending_transactions().await.unwrap();

	let first = tokio::time::timeout(Duration::from_secs(5), hashes.recv())
		.await
		.unwrap();
	let second = tokio::time::timeout(Duration::from_secs(5), hashes.recv())
		.await
		.unwrap();
	assert_eq!(first.as_deref(), Some("0xaa"));
	assert_eq!(second.as_deref(), Some("0xbb"));
	filter.assert_async().await;
}

#[tokio::test]
async fn test_failed_filter_poll_keeps_the_stream_open() {
	let mut server = Server::new_async().await;
	let _filter = mock_rpc_result(
		&mut server,
		rpc_methods::NEW_PENDING_TRANSACTION_FILTER,
		json!("0x1"),
	)
	.await;
	// A mock with hits left wins over later ones, so the first poll gets the 502.
	let outage = server
		.mock("POST", "/")
		.match_body(Matcher::PartialJson(json!({
			"method": rpc_methods::GET_FILTER_CHANGES
		})))
		.with_status(502)
		.expect(1)
		.create_async()
		.await;
	let _changes = mock_rpc_result(
		&mut server,
		rpc_methods::GET_FILTER_CHANGES,
		json!(["0xabc"]),
	)
	.await;

	let transport = client_for(&server.url());
	let mut hashes = transport.subscribe_pending_transactions().await.unwrap();

	let hash = tokio::time::timeout(Duration::from_secs(5), hashes.recv())
		.await
		.unwrap();
	assert_eq!(hash.as_deref(), Some("0xabc"));
	outage.assert_async().await;
}

#[tokio::test]
async fn test_dropped_filter_is_reinstalled() {
	let mut server = Server::new_async().await;
	let filter = server
		.mock("POST", "/")
		.match_body(Matcher::PartialJson(json!({
			"method": rpc_methods::NEW_PENDING_TRANSACTION_FILTER
		})))
		.with_header("content-type", "application/json")
		.with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#)
		.expect(2)
		.create_async()
		.await;
	let _missing = server
		.mock("POST", "/")
		.match_body(Matcher::PartialJson(json!({
			"method": rpc_methods::GET_FILTER_CHANGES
		})))
		.with_header("content-type", "application/json")
		.with_body(r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"filter not found"}}"#)
		.expect(1)
		.create_async()
		.await;
	let _changes = mock_rpc_result(
		&mut server,
		rpc_methods::GET_FILTER_CHANGES,
		json!(["0xdef"]),
	)
	.await;

	let transport = client_for(&server.url());
	let mut hashes = transport.subscribe_pending_transactions().await.unwrap();

	let hash = tokio::time::timeout(Duration::from_secs(5), hashes.recv())
		.await
		.unwrap();
	assert_eq!(hash.as_deref(), Some("0xdef"));
	filter.assert_async().await;
}

#[tokio::test]
async fn test_missing_filter_id_is_rejected() {
	let mut server = Server::new_async().await;
	let _filter = mock_rpc_result(
		&mut server,
		rpc_methods::NEW_PENDING_TRANSACTION_FILTER,
		json!(null),
	)
	.await;

	let transport = client_for(&server.url());
	let result = transport.subscribe_pending_transactions().await;

	assert!(matches!(result, Err(TransportError::ResponseParse(_))));
}

#[tokio::test]
async fn test_factory_opens_http_transport_without_disconnect_signal() {
	let server = Server::new_async().await;
	let factory =
		DefaultTransportFactory::new(Duration::from_secs(1), Duration::from_millis(20)).unwrap();

	let transport = factory
		.connect(&Endpoint::new(server.url()))
		.await
		.unwrap();

	assert_eq!(transport.transport_kind(), TransportKind::Http);
	assert_eq!(transport.endpoint_uri(), server.url());
	assert!(transport.disconnect_signal().is_none());
}
