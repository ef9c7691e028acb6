use eth_blockprocessor::{
	models::{ChainEvent, RegisteredAccount, TailConfig, UNCONFIRMED_BLOCK_NUMBER},
	services::{
		blocksync::{EventHub, LiveTailEngine, MempoolWatcher, Step},
		bus::{BusError, InMemoryBus},
		notification::{InMemoryAccountRegistry, TxPublisher},
		storage::{BlockWriter, InMemoryStore},
	},
	utils::tests::{BlockBuilder, FakeChainReader, LogBuilder, TransactionBuilder},
};
use serde_json::{json, Value};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;

use crate::integration::mocks::{leadership, MockEventBus};

const ACCOUNT: &str = "0x00000000000000000000000000000000000000aa";
const TOKEN: &str = "0x00000000000000000000000000000000000000cc";

async fn registry() -> Arc<InMemoryAccountRegistry> {
	let registry = Arc::new(InMemoryAccountRegistry::new());
	registry
		.register(RegisteredAccount::new(ACCOUNT).with_token(TOKEN))
		.await;
	registry
}

async fn wait_for_messages(bus: &InMemoryBus, topic: &str, count: usize) -> Vec<Value> {
	for _ in 0..100 {
		let published = bus.published_on(topic);
		if published.len() >= count {
			return published;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	panic!("expected {} messages on {}", count, topic);
}

#[tokio::test]
async fn test_tail_blocks_reach_account_topics() {
	let reader = FakeChainReader::with_blocks(0..=5);
	reader.insert_block(
		BlockBuilder::new()
			.number(6)
			.add_transaction(TransactionBuilder::new().hash("0xplain").build())
			.add_transaction(
				TransactionBuilder::new()
					.hash("0xtoken")
					.to(TOKEN)
					.input("0xa9059cbb")
					.logs(vec![LogBuilder::new().address(TOKEN).build()])
					.build(),
			)
			.add_transaction(TransactionBuilder::new().hash("0xpaid").to(ACCOUNT).build())
			.build(),
	);

	let store = InMemoryStore::new();
	let (_sender, receiver) = leadership(true);
	let events = Arc::new(EventHub::new(16));
	let tail = LiveTailEngine::new(
		Arc::new(reader.clone()),
		BlockWriter::new(Arc::new(store), 1, receiver),
		events.clone(),
		TailConfig::default(),
		1,
		"integration",
	);

	let bus = Arc::new(InMemoryBus::new());
	let publisher = Arc::new(TxPublisher::new(bus.clone(), registry().await, "app"));
	let publisher_task = {
		let publisher = publisher.clone();
		let subscription = events.subscribe();
		tokio::spawn(async move { publisher.run(subscription).await })
	};

	tail.init().await.unwrap();
	assert_eq!(tail.step().await.unwrap(), Step::Advanced(5));
	assert_eq!(tail.step().await.unwrap(), Step::Advanced(6));

	let blocks = wait_for_messages(&bus, "app_block", 2).await;
	assert_eq!(blocks, vec![json!({"block": 5}), json!({"block": 6})]);

	let token_topic = format!("app_transaction.{}", TOKEN);
	let account_topic = format!("app_transaction.{}", ACCOUNT);
	let token_messages = wait_for_messages(&bus, &token_topic, 1).await;
	let account_messages = wait_for_messages(&bus, &account_topic, 1).await;
	assert_eq!(token_messages.len(), 1);
	assert_eq!(token_messages[0]["hash"], json!("0xtoken"));
	assert_eq!(token_messages[0]["blockNumber"], json!(6));
	assert_eq!(account_messages.len(), 1);
	assert_eq!(account_messages[0]["hash"], json!("0xpaid"));
	assert!(bus
		.published()
		.iter()
		.all(|message| message.payload.get("hash") != Some(&json!("0xplain"))));

	drop(tail);
	drop(events);
	assert!(publisher_task.await.unwrap().is_ok());
}

#[tokio::test]
async fn test_mempool_transactions_reach_account_topics() {
	let reader = FakeChainReader::new();
	let store = InMemoryStore::new();
	let (_sender, receiver) = leadership(true);
	let events = Arc::new(EventHub::new(16));
	let mut subscription = events.subscribe();
	let watcher = MempoolWatcher::new(
		Arc::new(reader.clone()),
		BlockWriter::new(Arc::new(store), 1, receiver),
		events.clone(),
		"integration",
		CancellationToken::new(),
	);

	reader.add_mempool_transaction(
		TransactionBuilder::new()
			.hash("0xincoming")
			.from(ACCOUNT)
			.unconfirmed()
			.build(),
	);
	reader.add_mempool_transaction(
		TransactionBuilder::new()
			.hash("0xunrelated")
			.unconfirmed()
			.build(),
	);
	assert!(watcher.process("0xincoming").await.unwrap().is_some());
	assert!(watcher.process("0xunrelated").await.unwrap().is_some());

	let bus = Arc::new(InMemoryBus::new());
	let publisher = TxPublisher::new(bus.clone(), registry().await, "app");
	for _ in 0..2 {
		let event = subscription.recv().await.unwrap();
		publisher.handle(&event).await.unwrap();
	}

	let messages = bus.published_on(&format!("app_transaction.{}", ACCOUNT));
	assert_eq!(messages.len(), 1);
	assert_eq!(messages[0]["hash"], json!("0xincoming"));
	assert_eq!(messages[0]["blockNumber"], json!(UNCONFIRMED_BLOCK_NUMBER));
	assert_eq!(messages[0]["index"], Value::Null);
	assert!(bus.published_on("app_block").is_empty());
}

#[tokio::test]
async fn test_broker_loss_stops_the_publisher() {
	let mut bus = MockEventBus::new();
	bus.expect_publish()
		.times(1)
		.returning(|_, _| Err(BusError::broker_unavailable("channel closed", None, None)));

	let publisher = TxPublisher::new(Arc::new(bus), registry().await, "app");
	let events = EventHub::new(4);
	let subscription = events.subscribe();
	events
		.emit(ChainEvent::Block(Arc::new(BlockBuilder::new().number(3).build())))
		.await;
	events
		.emit(ChainEvent::Block(Arc::new(BlockBuilder::new().number(4).build())))
		.await;

	let error = publisher.run(subscription).await.unwrap_err();
	assert!(error.is_fatal());
}

#[tokio::test]
async fn test_serialization_failure_is_skipped() {
	let mut bus = MockEventBus::new();
	let mut attempts = 0;
	bus.expect_publish().times(2).returning(move |_, _| {
		attempts += 1;
		if attempts == 1 {
			Err(BusError::serialization("bad payload", None, None))
		} else {
			Ok(())
		}
	});

	let publisher = TxPublisher::new(Arc::new(bus), registry().await, "app");
	let events = EventHub::new(4);
	let subscription = events.subscribe();
	events
		.emit(ChainEvent::Block(Arc::new(BlockBuilder::new().number(3).build())))
		.await;
	events
		.emit(ChainEvent::Block(Arc::new(BlockBuilder::new().number(4).build())))
		.await;
	drop(events);

	assert!(publisher.run(subscription).await.is_ok());
}
