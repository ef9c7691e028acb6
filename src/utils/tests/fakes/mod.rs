//! Fakes for the upstream side of the indexer.

mod transport;

pub use chain::FakeChainReader;
pub use transport::{FakeNode, FakeTransport, FakeTransportFactory};
