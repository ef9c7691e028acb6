//! Leader election state.

/// What this instance currently knows about leadership.
///
/// Owned by the elector and handed to writers as a read-only view; never global.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElectionState {
	/// Process-lifetime unique id of this instance
	pub self_id: String,
	/// Sender of the most recently observed `setMaster`, cleared at the start of every round
	pub current_leader: Option<String>,
	/// Whether the most recently observed `setMaster` named this instance
	pub is_leader: bool,
	/// Whether the current round has finished
	pub synced: bool,
}

impl ElectionState {
	pub fn new(self_id: impl Into<String>) -> Self {
		Self {
			self_id: self_id.into(),
			current_leader: None,
			is_leader: false,
			synced: false,
		}
	}

	/// Resets the leader knowledge for a new round. Leadership itself only changes when a
	/// `setMaster` is observed.
	pub fn begin_round(&mut self) {
		self.current_leader = None;
		self.synced = false;
	}

	pub fn observe_leader(&mut self, leader_id: &str) {
		self.is_leader = leader_id == self.self_id;
		self.current_leader = Some(leader_id.to_string());
	}

	/// Either leader, or a finished round confirmed another leader.
	pub fn leader_or_synced(&self) -> bool {
		self.is_leader || (self.synced && self.current_leader.is_some())
	}
}
