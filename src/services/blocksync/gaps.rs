//! Gap discovery by range bisection.
//!
//! `[0, safe_height]` is cut into chunks and each chunk's persisted block count is compared with
//! its length: full chunks are skipped, empty chunks are gaps, and partial chunks are cut again
//! at a tenth of the chunk size, down to single blocks.

use tracing::debug;

use crate::{
	models::BlockRange,
	services::storage::{PersistenceGateway, StoreError},
};

/// Finds every missing block number in `[0, safe_height]`.
///
/// # Arguments
/// * `store` - Store answering the range counts
/// * `safe_height` - Highest block number considered final
/// * `chunk_size` - Initial chunk length
///
/// # Returns
/// * `Result<Vec<BlockRange>, StoreError>` - Disjoint, non-adjacent gaps, newest first
pub async fn discover_gaps(
	store: &dyn PersistenceGateway,
	safe_height: u64,
	chunk_size: u64,
) -> Result<Vec<BlockRange>, StoreError> {
	let chunk_size = chunk_size.max(1);
	let mut pending = split(BlockRange::new(0, safe_height), chunk_size);
	let mut gaps = Vec::new();
	let mut queries = 0usize;

	while let Some((range, size)) = pending.pop() {
		let count = store.count_in_range(range.from, range.to).await?;
		queries += 1;
		if count >= range.len() {
			continue;
		}
		if count == 0 {
			gaps.push(range);
			continue;
		}
		let next = (size / 10).max(1);
		pending.extend(split(range, next));
	}

	debug!(safe_height, queries, gaps = gaps.len(), "Gap discovery finished");
	Ok(merge_newest_first(gaps))
}

/// Cuts `range` into consecutive pieces of at most `size` blocks, each tagged with `size`.
fn split(range: BlockRange, size: u64) -> Vec<(BlockRange, u64)> {
	let mut pieces = Vec::new();
	let mut from = range.from;
	loop {
		let to = from.saturating_add(size - 1).min(range.to);
		pieces.push((BlockRange::new(from, to), size));
		if to == range.to {
			break;
		}
		from = to + 1;
	}
	pieces
}

fn merge_newest_first(mut gaps: Vec<BlockRange>) -> Vec<BlockRange> {
	gaps.sort();
	let mut merged: Vec<BlockRange> = Vec::with_capacity(gaps.len());
	for gap in gaps {
		match merged.last_mut() {
			Some(last) if last.to + 1 >= gap.from => last.to = last.to.max(gap.to),
			_ => merged.push(gap),
		}
	}
	merged.reverse();
	merged
}
