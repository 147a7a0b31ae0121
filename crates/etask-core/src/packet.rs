//! Packet layout engine.
//!
//! Both packet shapes share one prefix and differ only in the trailing frame
//! check sequence:
//!
//! ```text
//! Offset      | Width | Field
//! ------------+-------+-----------------------------
//! 0           | 4     | header
//! 4           | 1     | status_code
//! 5           | W     | task_id       (1/2/4/8, LE)
//! 5+W         | P     | payload
//! 5+W+P       | F     | checksum      (framed only, LE)
//! ```
//!
//! A [`Layout`] fixes `total_size`, `W` and the packet kind once, after
//! checking size and alignment against the [`Protocol`] word size. Packets
//! are then encoded and parsed against that layout with explicit offsets.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::config::Protocol;
use crate::header::Header;

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LayoutError {
    #[error("packet too small: {size} bytes, minimum is {minimum}")]
    TooSmall { size: usize, minimum: usize },
    #[error("packet size {size} not aligned to {word_size}-byte words")]
    NotAligned { size: usize, word_size: usize },
    #[error("task id {task_id:#x} does not fit in {width} byte(s)")]
    TaskIdOutOfRange { task_id: u64, width: usize },
    #[error("payload too large: {len} bytes, capacity is {capacity}")]
    PayloadTooLarge { len: usize, capacity: usize },
    #[error("checksum {value:#x} does not fit in {width} byte(s)")]
    ChecksumOutOfRange { value: u64, width: usize },
    #[error("packet has no checksum field")]
    NoChecksumField,
    #[error("expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("invalid task id width: {0} (expected 1, 2, 4 or 8)")]
    InvalidTaskIdWidth(u8),
}

// ── Task id width ─────────────────────────────────────────────────────────────

/// Width of the task-id field in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum TaskIdWidth {
    U8 = 1,
    U16 = 2,
    U32 = 4,
    U64 = 8,
}

impl TaskIdWidth {
    pub fn bytes(&self) -> usize {
        *self as usize
    }

    pub fn max_value(&self) -> u64 {
        match self {
            Self::U8 => u64::from(u8::MAX),
            Self::U16 => u64::from(u16::MAX),
            Self::U32 => u64::from(u32::MAX),
            Self::U64 => u64::MAX,
        }
    }

    /// Smallest width that can hold `uid`. Bounds are inclusive: 255 still fits one byte.
    pub fn for_max_uid(uid: u64) -> Self {
        [Self::U8, Self::U16, Self::U32]
            .into_iter()
            .find(|w| uid <= w.max_value())
            .unwrap_or(Self::U64)
    }
}

impl TryFrom<u8> for TaskIdWidth {
    type Error = LayoutError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::U8),
            2 => Ok(Self::U16),
            4 => Ok(Self::U32),
            8 => Ok(Self::U64),
            other => Err(LayoutError::InvalidTaskIdWidth(other)),
        }
    }
}

impl From<TaskIdWidth> for u8 {
    fn from(width: TaskIdWidth) -> u8 {
        width as u8
    }
}

// ── Kind ──────────────────────────────────────────────────────────────────────

/// Packet shape: unchecked, or framed by a checksum policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Basic,
    Framed(Checksum),
}

impl PacketKind {
    /// Width of the trailing field. Zero for basic and for `Framed(None)`.
    pub fn trailer_width(&self) -> usize {
        match self {
            Self::Basic => 0,
            Self::Framed(policy) => policy.width(),
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic => f.write_str("basic"),
            Self::Framed(policy) => write!(f, "framed/{policy}"),
        }
    }
}

// ── Layout ────────────────────────────────────────────────────────────────────

/// Validated byte layout for one packet configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layout {
    kind: PacketKind,
    total_size: usize,
    task_id_width: TaskIdWidth,
}

impl Layout {
    pub const STATUS_OFFSET: usize = Header::SIZE;
    pub const TASK_ID_OFFSET: usize = Header::SIZE + 1;

    /// Size of a packet with an empty payload.
    pub fn minimum_size(kind: PacketKind, task_id_width: TaskIdWidth) -> usize {
        Self::TASK_ID_OFFSET + task_id_width.bytes() + kind.trailer_width()
    }

    /// Checks the minimum size first, then word alignment.
    pub fn new(
        protocol: &Protocol,
        kind: PacketKind,
        total_size: usize,
        task_id_width: TaskIdWidth,
    ) -> Result<Self, LayoutError> {
        let minimum = Self::minimum_size(kind, task_id_width);
        if total_size < minimum {
            return Err(LayoutError::TooSmall {
                size: total_size,
                minimum,
            });
        }
        let word_size = protocol.word_size();
        if total_size % word_size != 0 {
            return Err(LayoutError::NotAligned {
                size: total_size,
                word_size,
            });
        }
        Ok(Self {
            kind,
            total_size,
            task_id_width,
        })
    }

    pub fn kind(&self) -> PacketKind {
        self.kind
    }

    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn task_id_width(&self) -> TaskIdWidth {
        self.task_id_width
    }

    /// Checksum policy, `Checksum::None` for basic packets.
    pub fn checksum_policy(&self) -> Checksum {
        match self.kind {
            PacketKind::Basic => Checksum::None,
            PacketKind::Framed(policy) => policy,
        }
    }

    pub fn payload_offset(&self) -> usize {
        Self::TASK_ID_OFFSET + self.task_id_width.bytes()
    }

    pub fn payload_size(&self) -> usize {
        self.total_size - self.payload_offset() - self.kind.trailer_width()
    }

    /// Start of the trailing field, which is also the number of bytes the
    /// checksum covers.
    pub fn checksum_offset(&self) -> usize {
        self.payload_offset() + self.payload_size()
    }
}

// ── Packet ────────────────────────────────────────────────────────────────────

/// One decoded packet bound to its layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    layout: Layout,
    header: Header,
    status_code: u8,
    task_id: u64,
    payload: Vec<u8>,
    // Meaningful only when the layout has a trailing field.
    fcs: u64,
}

impl Packet {
    /// Build a packet. The payload is zero-filled up to the layout's capacity.
    pub fn new(
        layout: Layout,
        header: Header,
        task_id: u64,
        status_code: u8,
        payload: &[u8],
    ) -> Result<Self, LayoutError> {
        check_task_id(&layout, task_id)?;
        let capacity = layout.payload_size();
        if payload.len() > capacity {
            return Err(LayoutError::PayloadTooLarge {
                len: payload.len(),
                capacity,
            });
        }
        let mut buf = vec![0u8; capacity];
        buf[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            layout,
            header,
            status_code,
            task_id,
            payload: buf,
            fcs: 0,
        })
    }

    /// Preload the checksum field. Ignored when the layout has no field.
    pub fn with_checksum_seed(mut self, seed: u64) -> Result<Self, LayoutError> {
        if self.layout.kind.trailer_width() > 0 {
            self.set_checksum(seed)?;
        }
        Ok(self)
    }

    /// Parse a wire image. `raw` must be exactly `layout.total_size()` bytes.
    pub fn from_bytes(raw: &[u8], layout: Layout) -> Result<Self, LayoutError> {
        if raw.len() != layout.total_size {
            return Err(LayoutError::LengthMismatch {
                expected: layout.total_size,
                actual: raw.len(),
            });
        }
        let mut header = [0u8; Header::SIZE];
        header.copy_from_slice(&raw[..Header::SIZE]);

        let task_start = Layout::TASK_ID_OFFSET;
        let payload_start = layout.payload_offset();
        let fcs_start = layout.checksum_offset();

        Ok(Self {
            layout,
            header: Header::decode(&header),
            status_code: raw[Layout::STATUS_OFFSET],
            task_id: read_le(&raw[task_start..payload_start]),
            payload: raw[payload_start..fcs_start].to_vec(),
            fcs: read_le(&raw[fcs_start..]),
        })
    }

    /// Exact wire image, `layout.total_size()` bytes long.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.layout.total_size);
        out.extend_from_slice(&self.header.encode());
        out.push(self.status_code);
        out.extend_from_slice(&self.task_id.to_le_bytes()[..self.layout.task_id_width.bytes()]);
        out.extend_from_slice(&self.payload);
        out.extend_from_slice(&self.fcs.to_le_bytes()[..self.layout.kind.trailer_width()]);
        out
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn kind(&self) -> PacketKind {
        self.layout.kind
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    pub fn set_header(&mut self, header: Header) {
        self.header = header;
    }

    pub fn status_code(&self) -> u8 {
        self.status_code
    }

    pub fn set_status_code(&mut self, status_code: u8) {
        self.status_code = status_code;
    }

    pub fn task_id(&self) -> u64 {
        self.task_id
    }

    pub fn set_task_id(&mut self, task_id: u64) -> Result<(), LayoutError> {
        check_task_id(&self.layout, task_id)?;
        self.task_id = task_id;
        Ok(())
    }

    /// Full payload window, including trailing zero fill.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    /// Replace the payload; the remainder of the window is zeroed.
    pub fn set_payload(&mut self, payload: &[u8]) -> Result<(), LayoutError> {
        let capacity = self.payload.len();
        if payload.len() > capacity {
            return Err(LayoutError::PayloadTooLarge {
                len: payload.len(),
                capacity,
            });
        }
        self.payload.fill(0);
        self.payload[..payload.len()].copy_from_slice(payload);
        Ok(())
    }

    /// Stored checksum, or `None` when the packet has no trailing field.
    pub fn checksum(&self) -> Option<u64> {
        (self.layout.kind.trailer_width() > 0).then_some(self.fcs)
    }

    pub fn set_checksum(&mut self, value: u64) -> Result<(), LayoutError> {
        let policy = self.layout.checksum_policy();
        if policy.width() == 0 {
            return Err(LayoutError::NoChecksumField);
        }
        if value > policy.max_value() {
            return Err(LayoutError::ChecksumOutOfRange {
                value,
                width: policy.width(),
            });
        }
        self.fcs = value;
        Ok(())
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} status={} task={:#x} payload={}B",
            self.layout.kind,
            self.header,
            self.status_code,
            self.task_id,
            self.payload.len(),
        )?;
        if let Some(fcs) = self.checksum() {
            write!(f, " fcs={fcs:#x}")?;
        }
        Ok(())
    }
}

fn check_task_id(layout: &Layout, task_id: u64) -> Result<(), LayoutError> {
    if task_id > layout.task_id_width.max_value() {
        return Err(LayoutError::TaskIdOutOfRange {
            task_id,
            width: layout.task_id_width.bytes(),
        });
    }
    Ok(())
}

/// Little-endian unsigned read of up to 8 bytes. Empty slices read as 0.
fn read_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
