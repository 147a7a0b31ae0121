//! Seal / validate pipeline for the frame check sequence.
//!
//! Stateless: both functions only touch the packet they are handed.

use crate::checksum::compute;
use crate::packet::{LayoutError, Packet, PacketKind};

/// Checksum over every encoded byte ahead of the trailing field.
/// `None` when the packet carries no field.
fn expected(packet: &Packet) -> Option<u64> {
    match packet.kind() {
        PacketKind::Basic => None,
        PacketKind::Framed(policy) if policy.width() == 0 => None,
        PacketKind::Framed(policy) => {
            let bytes = packet.to_bytes();
            Some(compute(policy, &bytes[..packet.layout().checksum_offset()]))
        }
    }
}

/// True for basic and unchecked packets, otherwise compares the stored
/// checksum against a fresh computation.
pub fn is_valid(packet: &Packet) -> bool {
    match expected(packet) {
        None => true,
        Some(value) => packet.checksum() == Some(value),
    }
}

/// Compute and store the checksum. No-op for packets without a field.
pub fn seal(packet: &mut Packet) -> Result<(), LayoutError> {
    match expected(packet) {
        None => Ok(()),
        Some(value) => packet.set_checksum(value),
    }
}
