//! Property-based tests for gap discovery.

use eth_blockprocessor::{
	models::BlockRange,
	services::{
		blocksync::discover_gaps,
		storage::{InMemoryStore, PersistenceGateway},
	},
	utils::tests::BlockBuilder,
};
use proptest::{prelude::*, test_runner::Config};
use std::collections::BTreeSet;

// Strategy for a safe height and the persisted subset of [0, safe_height]
fn arb_history() -> impl Strategy<Value = (u64, BTreeSet<u64>)> {
	(0u64..400).prop_flat_map(|safe_height| {
		prop::collection::vec(any::<bool>(), safe_height as usize + 1).prop_map(move |present| {
			let persisted = present
				.iter()
				.enumerate()
				.filter(|(_, present)| **present)
				.map(|(number, _)| number as u64)
				.collect();
			(safe_height, persisted)
		})
	})
}

fn gaps_for(safe_height: u64, persisted: &BTreeSet<u64>, chunk_size: u64) -> Vec<BlockRange> {
	let runtime = tokio::runtime::Builder::new_current_thread()
		.build()
		.unwrap();
	runtime.block_on(async {
		let store = InMemoryStore::new();
		for number in persisted {
			store
				.upsert_block(&BlockBuilder::new().number(*number).build().record())
				.await
				.unwrap();
		}
		discover_gaps(&store, safe_height, chunk_size).await.unwrap()
	})
}

proptest! {
	#![proptest_config(Config {
		cases: 64,
		failure_persistence: None,
		..Config::default()
	})]

	#[test]
	fn prop_gaps_are_the_complement_of_the_store(
		(safe_height, persisted) in arb_history(),
		chunk_size in 1u64..500
	) {
		let gaps = gaps_for(safe_height, &persisted, chunk_size);

		let missing: BTreeSet<u64> = gaps.iter().flat_map(|gap| gap.numbers()).collect();
		let expected: BTreeSet<u64> = (0..=safe_height)
			.filter(|number| !persisted.contains(number))
			.collect();
		prop_assert_eq!(missing, expected);
	}

	#[test]
	fn prop_gaps_are_newest_first_and_separated(
		(safe_height, persisted) in arb_history(),
		chunk_size in 1u64..500
	) {
		let gaps = gaps_for(safe_height, &persisted, chunk_size);

		for pair in gaps.windows(2) {
			// A gap ending right below the next one would have been merged.
			prop_assert!(pair[1].to + 1 < pair[0].from);
		}
		for gap in &gaps {
			prop_assert!(gap.from <= gap.to);
			prop_assert!(gap.to <= safe_height);
		}
	}
}
