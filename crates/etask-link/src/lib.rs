//! etask-link — transports for etask packets.
//!
//! An [`Interface`] wraps one reconnectable byte stream and turns it into a
//! packet pipe with destination filtering and checksum validation. A [`Hub`]
//! fans packets out over many interfaces and races them for inbound traffic.

pub mod connector;
pub mod error;
pub mod hub;
pub mod interface;
pub mod memory;

pub use connector::{BoxedStream, Connector, LinkStream, TcpConnector};
#[cfg(feature = "serial")]
pub use connector::SerialConnector;
pub use error::LinkError;
pub use hub::Hub;
pub use interface::{Interface, LinkState};
pub use memory::{memory_link, memory_link_with_capacity, MemoryConnector, MemoryPeer};
