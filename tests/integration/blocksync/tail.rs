use eth_blockprocessor::{
	models::{BackfillConfig, TailConfig},
	services::{
		blocksync::{
			EventHub, HistoricalBackfillEngine, LiveTailEngine, Step, SyncInterrupt, TailState,
		},
		storage::{BlockWriter, InMemoryStore, PersistenceGateway},
	},
	utils::tests::FakeChainReader,
};
use mockall::predicate;
use std::sync::Arc;

use crate::integration::mocks::{leadership, store_down, MockPersistenceGateway};

fn tail(
	reader: &FakeChainReader,
	writer: BlockWriter,
	events: Arc<EventHub>,
	depth: usize,
) -> LiveTailEngine {
	LiveTailEngine::new(
		Arc::new(reader.clone()),
		writer,
		events,
		TailConfig {
			poll_interval_ms: 100,
			retry_delay_ms: 100,
		},
		depth,
		"integration",
	)
}

#[tokio::test(start_paused = true)]
async fn test_store_loss_at_startup_stops_the_tail() {
	let mut store = MockPersistenceGateway::new();
	store
		.expect_find_latest()
		.returning(|_| Err(store_down()));

	let (_sender, receiver) = leadership(true);
	let writer = BlockWriter::new(Arc::new(store), 1, receiver);
	let reader = FakeChainReader::with_blocks(0..=10);
	let engine = tail(&reader, writer, Arc::new(EventHub::new(8)), 3);

	let error = engine.run().await.unwrap_err();
	assert!(error.is_fatal());
	assert_eq!(engine.state(), TailState::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_store_loss_during_rollback_stops_the_tail() {
	let reader = FakeChainReader::with_blocks(0..=100);
	let records = vec![
		reader.block(99).unwrap().record(),
		reader.block(98).unwrap().record(),
	];
	reader.reorg_from(99, 1);

	let mut store = MockPersistenceGateway::new();
	store
		.expect_find_latest()
		.with(predicate::eq(2))
		.returning(move |_| Ok(records.clone()));
	store.expect_delete_all_unconfirmed().returning(|| Ok(0));
	store
		.expect_delete_by_block_number()
		.with(predicate::eq(99))
		.times(1)
		.returning(|_| Err(store_down()));

	let (_sender, receiver) = leadership(true);
	let writer = BlockWriter::new(Arc::new(store), 1, receiver);
	let engine = tail(&reader, writer, Arc::new(EventHub::new(8)), 2);

	let error = engine.run().await.unwrap_err();
	assert!(error.is_fatal());
	assert_eq!(engine.state(), TailState::Stopped);
}

#[tokio::test]
async fn test_tail_resumes_where_backfill_stopped() {
	let reader = FakeChainReader::new();
	reader.extend_to(50);
	let store = InMemoryStore::new();
	let (_sender, receiver) = leadership(true);
	let writer = BlockWriter::new(Arc::new(store.clone()), 1, receiver);
	let events = Arc::new(EventHub::new(256));

	let backfill = HistoricalBackfillEngine::new(
		Arc::new(reader.clone()),
		writer.clone(),
		events.clone(),
		BackfillConfig {
			chunk_size: 16,
			retry_delay_ms: 10,
		},
		10,
		1,
		"integration",
	);
	let plan = backfill.sync().await.unwrap();
	assert_eq!(plan.target_height, 40);

	let engine = tail(&reader, writer, events, 10);
	engine.init().await.unwrap();
	assert_eq!(engine.cursor().await.height(), 41);

	let mut advanced = Vec::new();
	loop {
		match engine.step().await.unwrap() {
			Step::Advanced(number) => advanced.push(number),
			Step::Interrupted(interrupt) => {
				assert_eq!(interrupt, SyncInterrupt::WaitForNextBlock);
				break;
			}
		}
	}
	assert_eq!(advanced, (41..=50).collect::<Vec<_>>());
	assert_eq!(store.block_numbers().await, (0..=50).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_deep_reorg_is_repaired_block_by_block() {
	let reader = FakeChainReader::new();
	reader.extend_to(30);
	let store = InMemoryStore::new();
	let (_sender, receiver) = leadership(true);
	let writer = BlockWriter::new(Arc::new(store.clone()), 1, receiver);
	let engine = tail(&reader, writer, Arc::new(EventHub::new(256)), 3);

	for number in 0..=30 {
		store
			.upsert_block(&reader.block(number).unwrap().record())
			.await
			.unwrap();
	}
	engine.init().await.unwrap();
	reader.reorg_from(25, 2);
	reader.extend_to(31);

	let mut reorgs = 0;
	for _ in 0..64 {
		match engine.step().await.unwrap() {
			Step::Interrupted(SyncInterrupt::ReorgDetected { height }) => {
				reorgs += 1;
				engine.rollback(height).await.unwrap();
			}
			Step::Interrupted(SyncInterrupt::WaitForNextBlock) => break,
			Step::Advanced(_) | Step::Interrupted(SyncInterrupt::NotYetSynced) => {}
		}
	}

	// The persisted tip is replaced first, then the rest of the window below it.
	assert_eq!(reorgs, 2);
	assert_eq!(engine.cursor().await.height(), 32);
	for number in 25..=31 {
		let stored = store.find_by_number(number).await.unwrap().unwrap();
		assert_eq!(stored.hash, reader.block(number).unwrap().hash);
	}
}
