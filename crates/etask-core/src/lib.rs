//! etask-core — wire format, checksums, and packet layout for the etask protocol.
//! Everything here is synchronous and I/O free; etask-link builds on it.

pub mod checksum;
pub mod config;
pub mod header;
pub mod packet;
pub mod schema;
pub mod status;
pub mod validator;

pub use checksum::{compute, compute_chunks, Checksum, Digest};
pub use config::{ConfigError, EtaskConfig, Protocol};
pub use header::{Header, HeaderFields, HeaderFlags, HeaderType};
pub use packet::{Layout, LayoutError, Packet, PacketKind, TaskIdWidth};
pub use schema::{SchemaError, TaskSchema};
pub use status::StatusCode;
