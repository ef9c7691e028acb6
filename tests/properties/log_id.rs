//! Property-based tests for log identifiers.

use eth_blockprocessor::models::derive_log_id;
use proptest::{prelude::*, test_runner::Config};

proptest! {
	#![proptest_config(Config {
		failure_persistence: None,
		..Config::default()
	})]

	#[test]
	fn prop_log_id_is_deterministic(
		block_number in any::<u64>(),
		tx_index in 0u64..10_000,
		log_index in 0u64..10_000
	) {
		let id = derive_log_id(block_number, tx_index, log_index);
		prop_assert_eq!(&id, &derive_log_id(block_number, tx_index, log_index));
		prop_assert_eq!(id.len(), 32);
		prop_assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
	}

	#[test]
	fn prop_log_id_separates_coordinates(
		block_number in 0u64..1_000_000,
		tx_index in 0u64..1_000,
		log_index in 0u64..1_000
	) {
		let id = derive_log_id(block_number, tx_index, log_index);
		prop_assert_ne!(&id, &derive_log_id(block_number + 1, tx_index, log_index));
		prop_assert_ne!(&id, &derive_log_id(block_number, tx_index + 1, log_index));
		prop_assert_ne!(&id, &derive_log_id(block_number, tx_index, log_index + 1));
	}
}
