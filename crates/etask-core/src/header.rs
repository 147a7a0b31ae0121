//! Packet header: the fixed 32-bit routing word in front of every packet.
//!
//! Wire layout (little-endian, 4 bytes):
//!
//! ```text
//! Bytes 0-1      | Byte 2        | Byte 3
//! +--------------+---------------+-------------+
//! |    space     | sender_id (L) | receiver_id |
//! +--------------+---------------+-------------+
//! ```
//!
//! `space` bits, MSB to LSB:
//!
//! ```text
//! | 15..12 | 11..10  | 9   | 8    | 7..5     | 4..2  | 1         | 0        |
//! | type   | ver (L) | enc | frag | priority | flags | validated | reserved |
//! ```
//!
//! (L) fields are locked: constructors always stamp them from the
//! process-wide [`Protocol`], whatever the caller passed in.

use std::fmt;
use std::ops::BitOr;

use static_assertions::assert_eq_size;
use zerocopy::byteorder::{LittleEndian, U16};
use zerocopy::{AsBytes, FromBytes, FromZeroes};

use crate::config::Protocol;

// ── Bit layout ────────────────────────────────────────────────────────────────

const TYPE_SHIFT: u16 = 12;
const VERSION_SHIFT: u16 = 10;
const ENCRYPTED_BIT: u16 = 1 << 9;
const FRAGMENTED_BIT: u16 = 1 << 8;
const PRIORITY_SHIFT: u16 = 5;
const FLAGS_SHIFT: u16 = 2;
const VALIDATED_BIT: u16 = 1 << 1;
const RESERVED_BIT: u16 = 1;

const VERSION_MASK: u16 = 0x3 << VERSION_SHIFT;

// ── Wire image ────────────────────────────────────────────────────────────────

/// Exact on-wire image of the header.
#[derive(Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C, packed)]
struct WireHeader {
    space: U16<LittleEndian>,
    sender_id: u8,
    receiver_id: u8,
}

// Compile-time size guard. If this fails, the wire format has silently changed.
assert_eq_size!(WireHeader, [u8; 4]);

// ── Header type ───────────────────────────────────────────────────────────────

/// The 4-bit packet category carried in `space[15:12]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum HeaderType {
    /// Generic application data.
    #[default]
    Data = 0x0,
    Config = 0x1,
    /// Protocol-level commands.
    Control = 0x2,
    Routing = 0x3,
    TimeSync = 0x4,
    Auth = 0x5,
    Session = 0x6,
    /// Device status or health.
    Status = 0x7,
    Log = 0x8,
    Debug = 0x9,
    Firmware = 0xA,
    ReservedB = 0xB,
    ReservedC = 0xC,
    ReservedD = 0xD,
    ReservedE = 0xE,
    ReservedF = 0xF,
}

impl HeaderType {
    /// Decode the low four bits. Every value is representable.
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0xF {
            0x0 => Self::Data,
            0x1 => Self::Config,
            0x2 => Self::Control,
            0x3 => Self::Routing,
            0x4 => Self::TimeSync,
            0x5 => Self::Auth,
            0x6 => Self::Session,
            0x7 => Self::Status,
            0x8 => Self::Log,
            0x9 => Self::Debug,
            0xA => Self::Firmware,
            0xB => Self::ReservedB,
            0xC => Self::ReservedC,
            0xD => Self::ReservedD,
            0xE => Self::ReservedE,
            _ => Self::ReservedF,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Config => "config",
            Self::Control => "control",
            Self::Routing => "routing",
            Self::TimeSync => "time_sync",
            Self::Auth => "auth",
            Self::Session => "session",
            Self::Status => "status",
            Self::Log => "log",
            Self::Debug => "debug",
            Self::Firmware => "firmware",
            Self::ReservedB => "reserved_b",
            Self::ReservedC => "reserved_c",
            Self::ReservedD => "reserved_d",
            Self::ReservedE => "reserved_e",
            Self::ReservedF => "reserved_f",
        }
    }

    /// Parse either a name (`"status"`) or a numeric value (`"7"`, `"0x7"`).
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let numeric = match text.strip_prefix("0x") {
            Some(hex) => u8::from_str_radix(hex, 16).ok(),
            None => text.parse::<u8>().ok(),
        };
        if let Some(bits) = numeric {
            return (bits <= 0xF).then(|| Self::from_bits(bits));
        }
        (0..=0xF)
            .map(Self::from_bits)
            .find(|t| t.name().eq_ignore_ascii_case(text))
    }
}

impl From<HeaderType> for u8 {
    fn from(t: HeaderType) -> u8 {
        t as u8
    }
}

// ── Flags ─────────────────────────────────────────────────────────────────────

/// Control flags in `space[4:2]`. Only three bits exist on the wire;
/// wider values are truncated, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HeaderFlags(u8);

impl HeaderFlags {
    pub const NONE: Self = Self(0);
    pub const ACK: Self = Self(1 << 0);
    pub const ERROR: Self = Self(1 << 1);
    pub const HEARTBEAT: Self = Self(1 << 2);

    const MASK: u8 = 0x7;

    pub fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::MASK)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Single flag by name: `none`, `ack`, `error` or `heartbeat`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" => Some(Self::NONE),
            "ack" => Some(Self::ACK),
            "error" => Some(Self::ERROR),
            "heartbeat" => Some(Self::HEARTBEAT),
            _ => None,
        }
    }
}

impl BitOr for HeaderFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

// ── Header ────────────────────────────────────────────────────────────────────

/// Field-by-field description used by [`Header::from_fields`].
///
/// Version and sender are deliberately absent: they come from [`Protocol`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderFields {
    pub kind: HeaderType,
    pub encrypted: bool,
    pub fragmented: bool,
    /// Masked to the low three bits.
    pub priority: u8,
    pub flags: HeaderFlags,
    pub validated: bool,
    pub reserved: bool,
    pub receiver_id: u8,
}

impl Default for HeaderFields {
    fn default() -> Self {
        Self {
            kind: HeaderType::Data,
            encrypted: false,
            fragmented: false,
            priority: 0,
            flags: HeaderFlags::NONE,
            validated: false,
            reserved: false,
            receiver_id: Header::DEFAULT_RECEIVER,
        }
    }
}

/// Decoded 32-bit packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Header {
    space: u16,
    sender_id: u8,
    receiver_id: u8,
}

impl Header {
    /// Wire size in bytes.
    pub const SIZE: usize = 4;

    /// Receiver used when the caller does not address anyone in particular.
    pub const DEFAULT_RECEIVER: u8 = 1;

    /// Build from a pre-shaped `space` word. Only the version bits are
    /// overwritten; the sender is stamped with the local board id.
    pub fn from_raw(protocol: &Protocol, raw: u16, receiver_id: u8) -> Self {
        let version = (u16::from(protocol.version()) << VERSION_SHIFT) & VERSION_MASK;
        Self {
            space: (raw & !VERSION_MASK) | version,
            sender_id: protocol.board_id(),
            receiver_id,
        }
    }

    /// Build the `space` word bit by bit.
    pub fn from_fields(protocol: &Protocol, fields: HeaderFields) -> Self {
        let space = ((u16::from(u8::from(fields.kind)) & 0xF) << TYPE_SHIFT)
            | (u16::from(fields.encrypted) * ENCRYPTED_BIT)
            | (u16::from(fields.fragmented) * FRAGMENTED_BIT)
            | ((u16::from(fields.priority) & 0x7) << PRIORITY_SHIFT)
            | (u16::from(fields.flags.bits() & HeaderFlags::MASK) << FLAGS_SHIFT)
            | (u16::from(fields.validated) * VALIDATED_BIT)
            | (u16::from(fields.reserved) * RESERVED_BIT);
        Self::from_raw(protocol, space, fields.receiver_id)
    }

    /// Byte-exact decode. Locked fields keep whatever the wire carried.
    pub fn decode(bytes: &[u8; Self::SIZE]) -> Self {
        // All 4-byte patterns are valid, so the read cannot fail.
        let wire = WireHeader::read_from(&bytes[..]).unwrap_or_else(WireHeader::new_zeroed);
        Self {
            space: wire.space.get(),
            sender_id: wire.sender_id,
            receiver_id: wire.receiver_id,
        }
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let wire = WireHeader {
            space: U16::new(self.space),
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
        };
        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(wire.as_bytes());
        out
    }

    /// The raw 16-bit `space` word.
    pub fn space(&self) -> u16 {
        self.space
    }

    pub fn kind(&self) -> HeaderType {
        HeaderType::from_bits((self.space >> TYPE_SHIFT) as u8)
    }

    pub fn version(&self) -> u8 {
        ((self.space & VERSION_MASK) >> VERSION_SHIFT) as u8
    }

    pub fn encrypted(&self) -> bool {
        self.space & ENCRYPTED_BIT != 0
    }

    pub fn fragmented(&self) -> bool {
        self.space & FRAGMENTED_BIT != 0
    }

    pub fn priority(&self) -> u8 {
        ((self.space >> PRIORITY_SHIFT) & 0x7) as u8
    }

    pub fn flags(&self) -> HeaderFlags {
        HeaderFlags::from_bits_truncate((self.space >> FLAGS_SHIFT) as u8)
    }

    pub fn validated(&self) -> bool {
        self.space & VALIDATED_BIT != 0
    }

    pub fn reserved(&self) -> bool {
        self.space & RESERVED_BIT != 0
    }

    pub fn sender_id(&self) -> u8 {
        self.sender_id
    }

    pub fn receiver_id(&self) -> u8 {
        self.receiver_id
    }

    pub fn set_receiver_id(&mut self, receiver_id: u8) {
        self.receiver_id = receiver_id;
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} v{} enc={} frag={} prio={} flags={:#05b} valid={} res={} {}->{}",
            self.kind().name(),
            self.version(),
            self.encrypted(),
            self.fragmented(),
            self.priority(),
            self.flags().bits(),
            self.validated(),
            self.reserved(),
            self.sender_id,
            self.receiver_id,
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
