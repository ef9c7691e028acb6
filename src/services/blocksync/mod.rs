//! Chain synchronization engines.
//!
//! - `gaps`: range bisection over the persisted history
//! - `backfill`: fills the gaps found below the safe height
//! - `tail`: follows the head and rolls back reorganizations
//! - `mempool`: persists pending transactions announced by the upstream
//! - `events`: bounded fan-out of the engines' events

mod backfill;
mod error;
mod events;
mod gaps;
mod mempool;
mod tail;

pub use backfill::{BackfillPlan, HistoricalBackfillEngine};
pub use error::{SyncError, SyncInterrupt};
pub use events::EventHub;
pub use gaps::discover_gaps;
pub use mempool::MempoolWatcher;
pub use tail::{LiveTailEngine, Step, TailState};
