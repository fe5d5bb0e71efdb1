//! Communication with the background agent

pub mod channel;
pub mod memory;
pub mod protocol;
pub mod transport;

pub use channel::CommsChannel;
pub use memory::MemoryAgent;
pub use protocol::{Command, Push, SyncResultEvent, WireSync};
pub use transport::{CapabilityProbe, Connection, Connector, StaticProbe, Transport, TransportError};
