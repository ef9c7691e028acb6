//! Publication of chain events to the message bus.
//!
//! - `filter`: registered account lookup
//! - `publisher`: turns engine events into bus messages

mod error;
mod filter;
mod publisher;

pub use error::NotificationError;
pub use filter::{AccountFilter, InMemoryAccountRegistry};
pub use publisher::TxPublisher;
