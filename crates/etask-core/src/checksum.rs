//! Checksum engine: the frame check sequence algorithms.
//!
//! Every policy is exposed through the same incremental [`Digest`] so the
//! result never depends on how the input was chunked. The CRC variants come
//! from the `crc` catalogue (CRC-32 from `crc32fast`); the additive and
//! Fletcher-style sums are small enough to keep here.

use std::fmt;
use std::str::FromStr;

use crc::{Crc, CRC_16_XMODEM, CRC_64_ECMA_182, CRC_8_SMBUS};
use serde::{Deserialize, Serialize};

// CRC-8/SMBUS: poly 0x07, init 0, no reflection, xorout 0.
static CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);
// CRC-16/XMODEM: poly 0x1021, init 0, no reflection, xorout 0.
static CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);
// CRC-64/ECMA-182: poly 0x42F0E1EBA9EA3693, init 0, no reflection, xorout 0.
static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_ECMA_182);

const FLETCHER16_MOD: u32 = 255;
const FLETCHER32_MOD: u32 = 65_535;
const ADLER32_MOD: u32 = 65_521;

// ── Policy ────────────────────────────────────────────────────────────────────

/// Checksum policy selecting one algorithm and the width of the trailing
/// field it occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Checksum {
    /// No trailing field at all.
    #[default]
    None,
    Sum8,
    Sum16,
    Sum32,
    Crc8,
    Crc16,
    Crc32,
    Crc64,
    Fletcher16,
    Fletcher32,
    Adler32,
    Internet16,
}

impl Checksum {
    pub const ALL: [Checksum; 12] = [
        Checksum::None,
        Checksum::Sum8,
        Checksum::Sum16,
        Checksum::Sum32,
        Checksum::Crc8,
        Checksum::Crc16,
        Checksum::Crc32,
        Checksum::Crc64,
        Checksum::Fletcher16,
        Checksum::Fletcher32,
        Checksum::Adler32,
        Checksum::Internet16,
    ];

    /// Field width in bytes.
    pub fn width(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Sum8 | Self::Crc8 => 1,
            Self::Sum16 | Self::Crc16 | Self::Fletcher16 | Self::Internet16 => 2,
            Self::Sum32 | Self::Crc32 | Self::Fletcher32 | Self::Adler32 => 4,
            Self::Crc64 => 8,
        }
    }

    /// Largest value the field can hold. Zero for `None`.
    pub fn max_value(&self) -> u64 {
        match self.width() {
            0 => 0,
            8 => u64::MAX,
            w => (1u64 << (w * 8)) - 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Sum8 => "sum8",
            Self::Sum16 => "sum16",
            Self::Sum32 => "sum32",
            Self::Crc8 => "crc8",
            Self::Crc16 => "crc16",
            Self::Crc32 => "crc32",
            Self::Crc64 => "crc64",
            Self::Fletcher16 => "fletcher16",
            Self::Fletcher32 => "fletcher32",
            Self::Adler32 => "adler32",
            Self::Internet16 => "internet16",
        }
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown checksum policy: {0}")]
pub struct UnknownChecksum(pub String);

impl FromStr for Checksum {
    type Err = UnknownChecksum;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownChecksum(s.to_string()))
    }
}

// ── Incremental digest ────────────────────────────────────────────────────────

enum State {
    None,
    Sum(u64),
    Crc8(crc::Digest<'static, u8>),
    Crc16(crc::Digest<'static, u16>),
    Crc32(crc32fast::Hasher),
    Crc64(crc::Digest<'static, u64>),
    Fletcher16 { sum1: u32, sum2: u32 },
    // `carry` holds the high byte of a 16-bit word split across chunks.
    Fletcher32 { sum1: u32, sum2: u32, carry: Option<u8> },
    Adler32 { a: u32, b: u32 },
    Internet16 { sum: u64, carry: Option<u8> },
}

/// Streaming checksum. Feed any number of chunks, then [`finalize`](Self::finalize).
pub struct Digest {
    policy: Checksum,
    state: State,
}

impl Digest {
    pub fn new(policy: Checksum) -> Self {
        let state = match policy {
            Checksum::None => State::None,
            Checksum::Sum8 | Checksum::Sum16 | Checksum::Sum32 => State::Sum(0),
            Checksum::Crc8 => State::Crc8(CRC8.digest()),
            Checksum::Crc16 => State::Crc16(CRC16.digest()),
            Checksum::Crc32 => State::Crc32(crc32fast::Hasher::new()),
            Checksum::Crc64 => State::Crc64(CRC64.digest()),
            Checksum::Fletcher16 => State::Fletcher16 { sum1: 0, sum2: 0 },
            Checksum::Fletcher32 => State::Fletcher32 {
                sum1: 0,
                sum2: 0,
                carry: None,
            },
            Checksum::Adler32 => State::Adler32 { a: 1, b: 0 },
            Checksum::Internet16 => State::Internet16 { sum: 0, carry: None },
        };
        Self { policy, state }
    }

    pub fn policy(&self) -> Checksum {
        self.policy
    }

    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            State::None => {}
            State::Sum(total) => {
                for &byte in data {
                    *total = total.wrapping_add(u64::from(byte));
                }
            }
            State::Crc8(digest) => digest.update(data),
            State::Crc16(digest) => digest.update(data),
            State::Crc32(hasher) => hasher.update(data),
            State::Crc64(digest) => digest.update(data),
            State::Fletcher16 { sum1, sum2 } => {
                for &byte in data {
                    *sum1 = (*sum1 + u32::from(byte)) % FLETCHER16_MOD;
                    *sum2 = (*sum2 + *sum1) % FLETCHER16_MOD;
                }
            }
            State::Fletcher32 { sum1, sum2, carry } => {
                for_each_word(carry, data, |word| {
                    *sum1 = (*sum1 + u32::from(word)) % FLETCHER32_MOD;
                    *sum2 = (*sum2 + *sum1) % FLETCHER32_MOD;
                });
            }
            State::Adler32 { a, b } => {
                for &byte in data {
                    *a = (*a + u32::from(byte)) % ADLER32_MOD;
                    *b = (*b + *a) % ADLER32_MOD;
                }
            }
            State::Internet16 { sum, carry } => {
                for_each_word(carry, data, |word| *sum += u64::from(word));
            }
        }
    }

    /// Final value, always within `policy.max_value()`.
    pub fn finalize(self) -> u64 {
        match self.state {
            State::None => 0,
            State::Sum(total) => total & self.policy.max_value(),
            State::Crc8(digest) => u64::from(digest.finalize()),
            State::Crc16(digest) => u64::from(digest.finalize()),
            State::Crc32(hasher) => u64::from(hasher.finalize()),
            State::Crc64(digest) => digest.finalize(),
            State::Fletcher16 { sum1, sum2 } => u64::from((sum2 << 8) | sum1),
            State::Fletcher32 {
                mut sum1,
                mut sum2,
                carry,
            } => {
                if let Some(high) = carry {
                    sum1 = (sum1 + (u32::from(high) << 8)) % FLETCHER32_MOD;
                    sum2 = (sum2 + sum1) % FLETCHER32_MOD;
                }
                u64::from((sum2 << 16) | sum1)
            }
            State::Adler32 { a, b } => u64::from((b << 16) | a),
            State::Internet16 { mut sum, carry } => {
                if let Some(high) = carry {
                    sum += u64::from(high) << 8;
                }
                while sum >> 16 != 0 {
                    sum = (sum & 0xFFFF) + (sum >> 16);
                }
                !sum & 0xFFFF
            }
        }
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Digest").field("policy", &self.policy).finish()
    }
}

/// Walk `data` as big-endian 16-bit words, pairing a byte left over from the
/// previous chunk with the first byte of this one.
fn for_each_word(carry: &mut Option<u8>, data: &[u8], mut f: impl FnMut(u16)) {
    let mut rest = data;
    if let Some(high) = *carry {
        match rest.split_first() {
            Some((&low, tail)) => {
                f(u16::from_be_bytes([high, low]));
                *carry = None;
                rest = tail;
            }
            None => return,
        }
    }
    let mut words = rest.chunks_exact(2);
    for pair in &mut words {
        f(u16::from_be_bytes([pair[0], pair[1]]));
    }
    *carry = words.remainder().first().copied();
}

// ── One-shot helpers ──────────────────────────────────────────────────────────

/// Checksum of a single buffer.
pub fn compute(policy: Checksum, data: &[u8]) -> u64 {
    let mut digest = Digest::new(policy);
    digest.update(data);
    digest.finalize()
}

/// Checksum of the concatenation of `chunks`.
pub fn compute_chunks<I>(policy: Checksum, chunks: I) -> u64
where
    I: IntoIterator,
    I::Item: AsRef<[u8]>,
{
    let mut digest = Digest::new(policy);
    for chunk in chunks {
        digest.update(chunk.as_ref());
    }
    digest.finalize()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
