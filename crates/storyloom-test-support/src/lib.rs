//! Shared test doubles for the Storyloom sync core.

mod clock;
mod store;
mod transport;

pub use clock::{FixedClock, SteppingClock};
pub use store::{FailingDocumentStore, MemoryDocumentStore, StalledDocumentStore};
pub use transport::{ChannelTransport, transport_pair};
