//! Packet options shared by encode, decode, send and recv.

use anyhow::{bail, Context, Result};

use etask_core::config::PacketKindConfig;
use etask_core::{
    Checksum, EtaskConfig, Header, HeaderFields, HeaderFlags, HeaderType, Layout, Packet,
    PacketKind, Protocol, TaskIdWidth, TaskSchema,
};

/// How a payload that does not match the packet's capacity is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PayloadFit {
    /// Zero-fill a short payload; a long one is an error.
    #[default]
    Pad,
    /// Zero-fill a short payload, truncate a long one.
    Clip,
    /// Lengths must match exactly (`error` on the command line).
    Strict,
}

/// Packet options as given on the command line. Anything unset falls back to
/// the `[packet]` section of the config.
#[derive(Debug, Default)]
pub struct PacketArgs {
    pub kind: Option<PacketKindConfig>,
    pub size: Option<usize>,
    pub width: Option<TaskIdWidth>,
    pub checksum: Option<Checksum>,
    pub task: u64,
    pub status: u8,
    pub receiver: Option<u8>,
    pub header_type: HeaderType,
    pub priority: u8,
    pub flags: HeaderFlags,
    pub encrypted: bool,
    pub fragmented: bool,
    pub validated: bool,
    pub reserved: bool,
    pub payload: Vec<u8>,
    pub payload_fit: PayloadFit,
    /// Arguments that are not options, in order.
    pub positional: Vec<String>,
}

pub fn parse(args: &[&str]) -> Result<PacketArgs> {
    let mut out = PacketArgs::default();
    let mut payload_from: Option<&str> = None;
    let mut iter = args.iter();
    while let Some(&arg) = iter.next() {
        if !arg.starts_with("--") {
            out.positional.push(arg.to_string());
            continue;
        }
        if let Some(bit) = out.switch(arg) {
            *bit = true;
            continue;
        }
        let value = *iter
            .next()
            .with_context(|| format!("{arg} requires a value"))?;
        match arg {
            "--kind" => {
                out.kind = Some(match value {
                    "basic" => PacketKindConfig::Basic,
                    "framed" => PacketKindConfig::Framed,
                    other => bail!("--kind must be basic or framed, got {other}"),
                })
            }
            "--size" => out.size = Some(parse_int(arg, value)?),
            "--width" => {
                let bytes: u8 = parse_int(arg, value)?;
                out.width = Some(TaskIdWidth::try_from(bytes)?);
            }
            "--checksum" => out.checksum = Some(value.parse()?),
            "--task" => out.task = parse_int(arg, value)?,
            "--status" => out.status = parse_int(arg, value)?,
            "--receiver" => out.receiver = Some(parse_int(arg, value)?),
            "--type" => {
                out.header_type = HeaderType::parse(value)
                    .with_context(|| format!("unknown header type: {value}"))?
            }
            "--priority" => out.priority = parse_int(arg, value)?,
            "--flags" => {
                for name in value.split(',').map(str::trim).filter(|n| !n.is_empty()) {
                    let flag = HeaderFlags::from_name(name)
                        .with_context(|| format!("unknown flag: {name} (none, ack, error, heartbeat)"))?;
                    out.flags = out.flags | flag;
                }
            }
            "--payload" | "--payload-file" => {
                if let Some(first) = payload_from.replace(arg) {
                    bail!("{arg} conflicts with {first}: give one payload source");
                }
                out.payload = if arg == "--payload" {
                    hex::decode(value).context("--payload must be hex")?
                } else {
                    std::fs::read(value).with_context(|| format!("reading payload file {value}"))?
                };
            }
            "--payload-fit" => {
                out.payload_fit = match value {
                    "pad" => PayloadFit::Pad,
                    "clip" => PayloadFit::Clip,
                    "error" => PayloadFit::Strict,
                    other => bail!("--payload-fit must be pad, clip or error, got {other}"),
                }
            }
            other => bail!("unknown option: {other}"),
        }
    }
    Ok(out)
}

/// Decimal or `0x`-prefixed hex.
pub fn parse_int<T: TryFrom<u64>>(name: &str, text: &str) -> Result<T> {
    let wide = match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    }
    .with_context(|| format!("{name}: invalid integer '{text}'"))?;
    T::try_from(wide).map_err(|_| anyhow::anyhow!("{name}: {wide} out of range"))
}

impl PacketArgs {
    /// The header bit behind a value-less option, if `arg` is one.
    fn switch(&mut self, arg: &str) -> Option<&mut bool> {
        match arg {
            "--encrypted" => Some(&mut self.encrypted),
            "--fragmented" => Some(&mut self.fragmented),
            "--validated" => Some(&mut self.validated),
            "--reserved" => Some(&mut self.reserved),
            _ => None,
        }
    }

    pub fn layout(&self, config: &EtaskConfig, protocol: &Protocol) -> Result<Layout> {
        let packet = &config.packet;
        let width = match (self.width, &packet.schema) {
            (Some(width), _) => width,
            (None, Some(path)) => TaskSchema::load(path)
                .with_context(|| format!("loading schema {}", path.display()))?
                .task_id_width(),
            (None, None) => packet.task_id_width,
        };
        let kind = match self.kind.unwrap_or(packet.kind) {
            PacketKindConfig::Basic => PacketKind::Basic,
            PacketKindConfig::Framed => PacketKind::Framed(self.checksum.unwrap_or(packet.checksum)),
        };
        let size = self.size.unwrap_or(packet.size);
        Layout::new(protocol, kind, size, width).context("invalid packet layout")
    }

    pub fn header(&self, protocol: &Protocol) -> Header {
        Header::from_fields(
            protocol,
            HeaderFields {
                kind: self.header_type,
                encrypted: self.encrypted,
                fragmented: self.fragmented,
                priority: self.priority,
                flags: self.flags,
                validated: self.validated,
                reserved: self.reserved,
                receiver_id: self.receiver.unwrap_or(Header::DEFAULT_RECEIVER),
            },
        )
    }

    pub fn packet(&self, config: &EtaskConfig, protocol: &Protocol) -> Result<Packet> {
        let layout = self.layout(config, protocol)?;
        let payload = self.fit_payload(layout.payload_size())?;
        Packet::new(layout, self.header(protocol), self.task, self.status, payload)
            .context("invalid packet")
    }

    fn fit_payload(&self, capacity: usize) -> Result<&[u8]> {
        let len = self.payload.len();
        match self.payload_fit {
            PayloadFit::Clip => Ok(&self.payload[..len.min(capacity)]),
            PayloadFit::Strict if len != capacity => {
                bail!("payload is {len} bytes, the packet carries exactly {capacity}")
            }
            _ => Ok(self.payload.as_slice()),
        }
    }
}
