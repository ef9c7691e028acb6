//! Live tail cursor and block ranges.

use std::collections::VecDeque;

use crate::models::BlockRecord;

/// Inclusive range of block numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockRange {
	pub from: u64,
	pub to: u64,
}

impl BlockRange {
	pub fn new(from: u64, to: u64) -> Self {
		debug_assert!(from <= to, "empty block range {}..={}", from, to);
		Self { from, to }
	}

	pub fn len(&self) -> u64 {
		self.to - self.from + 1
	}

	pub fn is_empty(&self) -> bool {
		false
	}

	pub fn contains(&self, number: u64) -> bool {
		self.from <= number && number <= self.to
	}

	pub fn numbers(&self) -> impl DoubleEndedIterator<Item = u64> {
		self.from..=self.to
	}
}

impl std::fmt::Display for BlockRange {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "[{}, {}]", self.from, self.to)
	}
}

/// Position of the live tail.
///
/// `height` is the next block number to fetch. `window` holds `(number, hash)` of the last
/// `depth` persisted blocks in ascending order; its last entry is the block at `height - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCursor {
	height: u64,
	window: VecDeque<(u64, String)>,
	depth: usize,
}

impl SyncCursor {
	/// An empty cursor that starts at genesis.
	pub fn new(depth: usize) -> Self {
		Self {
			height: 0,
			window: VecDeque::with_capacity(depth),
			depth,
		}
	}

	/// An empty cursor whose next block is `height`.
	pub fn starting_at(height: u64, depth: usize) -> Self {
		Self {
			height,
			..Self::new(depth)
		}
	}

	/// Builds the cursor from the latest persisted blocks, in any order.
	pub fn from_records(records: &[BlockRecord], depth: usize) -> Self {
		let mut sorted: Vec<&BlockRecord> = records.iter().collect();
		sorted.sort_by_key(|record| record.number);
		sorted.dedup_by_key(|record| record.number);
		let skip = sorted.len().saturating_sub(depth);
		let window: VecDeque<(u64, String)> = sorted
			.into_iter()
			.skip(skip)
			.map(|record| (record.number, record.hash.clone()))
			.collect();
		let height = window.back().map(|(number, _)| number + 1).unwrap_or(0);
		Self {
			height,
			window,
			depth,
		}
	}

	pub fn height(&self) -> u64 {
		self.height
	}

	pub fn depth(&self) -> usize {
		self.depth
	}

	/// The last persisted block, if any.
	pub fn tip(&self) -> Option<(u64, &str)> {
		self.window
			.back()
			.map(|(number, hash)| (*number, hash.as_str()))
	}

	/// Hashes of the window, oldest first.
	pub fn hashes(&self) -> Vec<&str> {
		self.window.iter().map(|(_, hash)| hash.as_str()).collect()
	}

	/// Records block `number` as persisted and moves to the next height.
	pub fn advance(&mut self, number: u64, hash: impl Into<String>) {
		debug_assert_eq!(number, self.height, "cursor advanced out of order");
		self.window.push_back((number, hash.into()));
		while self.window.len() > self.depth {
			self.window.pop_front();
		}
		self.height = number + 1;
	}

	/// Block numbers a rollback removes: the consensus-depth window below `height`, widened to
	/// include `suspect`.
	pub fn rollback_range(&self, suspect: u64) -> BlockRange {
		let from = self.height.saturating_sub(self.depth as u64).min(suspect);
		let to = self
			.height
			.checked_sub(1)
			.map_or(suspect, |top| top.max(suspect));
		BlockRange::new(from, to)
	}

	/// Forgets every block at or above `height` and resumes from there.
	pub fn rewind_to(&mut self, height: u64) {
		self.window.retain(|(number, _)| *number < height);
		self.height = self.height.min(height);
	}
}
