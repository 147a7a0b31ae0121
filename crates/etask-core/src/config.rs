//! Configuration for etask.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $ETASK_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/etask/config.toml
//!   3. ~/.config/etask/config.toml

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::checksum::Checksum;
use crate::packet::{Layout, LayoutError, PacketKind, TaskIdWidth};
use crate::schema::{SchemaError, TaskSchema};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Process-wide protocol constants: the locked header fields plus the
/// alignment unit every packet size must respect.
///
/// Built once at start-up and passed by reference to header and layout
/// constructors; there is no way to change it afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Protocol {
    version: u8,
    board_id: u8,
    word_size: usize,
}

impl Protocol {
    pub const MAX_VERSION: u8 = 3;

    pub fn new(version: u8, board_id: u8, word_size: usize) -> Result<Self, ConfigError> {
        if version > Self::MAX_VERSION {
            return Err(ConfigError::InvalidProtocol(format!(
                "version {version} exceeds {}",
                Self::MAX_VERSION
            )));
        }
        if !word_size.is_power_of_two() {
            return Err(ConfigError::InvalidProtocol(format!(
                "word size {word_size} is not a power of two"
            )));
        }
        Ok(Self {
            version,
            board_id,
            word_size,
        })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn board_id(&self) -> u8 {
        self.board_id
    }

    pub fn word_size(&self) -> usize {
        self.word_size
    }

    /// Same protocol, different board. Handy for simulating peers.
    pub fn with_board_id(self, board_id: u8) -> Self {
        Self { board_id, ..self }
    }
}

impl Default for Protocol {
    fn default() -> Self {
        Self {
            version: 0,
            board_id: 0,
            word_size: std::mem::size_of::<usize>(),
        }
    }
}

// ── File format ───────────────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EtaskConfig {
    pub protocol: ProtocolConfig,
    pub packet: PacketConfig,
    pub transports: Vec<TransportConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Protocol version stamped into every header (0-3).
    pub version: u8,
    /// Local board id. Used as sender and as the receive filter.
    pub board_id: u8,
    /// Alignment unit in bytes. Packet sizes must be a multiple of it.
    pub word_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketKindConfig {
    Basic,
    Framed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacketConfig {
    pub kind: PacketKindConfig,
    /// Total packet size in bytes, header included.
    pub size: usize,
    pub task_id_width: TaskIdWidth,
    /// Only consulted for framed packets.
    pub checksum: Checksum,
    /// Task schema (JSON). When set, the task-id width is derived from it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<PathBuf>,
}

/// One configured transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportConfig {
    pub name: String,
    #[serde(flatten)]
    pub endpoint: TransportEndpoint,
    #[serde(default = "enabled")]
    pub send: bool,
    #[serde(default = "enabled")]
    pub receive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TransportEndpoint {
    Tcp {
        /// `host:port`
        address: String,
        #[serde(default)]
        keepalive: bool,
    },
    Serial {
        path: String,
        #[serde(default = "default_baud")]
        baud: u32,
    },
}

fn enabled() -> bool {
    true
}

fn default_baud() -> u32 {
    115_200
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for EtaskConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolConfig::default(),
            packet: PacketConfig::default(),
            transports: Vec::new(),
        }
    }
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        let protocol = Protocol::default();
        Self {
            version: protocol.version,
            board_id: protocol.board_id,
            word_size: protocol.word_size,
        }
    }
}

impl Default for PacketConfig {
    fn default() -> Self {
        Self {
            kind: PacketKindConfig::Framed,
            size: 16,
            task_id_width: TaskIdWidth::U16,
            checksum: Checksum::Crc16,
            schema: None,
        }
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
        .join("etask")
}

fn home_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
    #[error("invalid protocol settings: {0}")]
    InvalidProtocol(String),
    #[error("invalid packet settings: {0}")]
    InvalidPacket(#[from] LayoutError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl EtaskConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::file_path())
    }

    /// Load from an explicit path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
            Self::from_toml_str(&text)
                .map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))?
        } else {
            EtaskConfig::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("ETASK_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        Self::write_default_at(&Self::file_path())
    }

    /// Same as [`write_default_if_missing`](Self::write_default_if_missing)
    /// for an explicit path.
    pub fn write_default_at(path: &Path) -> Result<PathBuf, ConfigError> {
        let path = path.to_path_buf();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&EtaskConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Validated protocol constants.
    pub fn protocol(&self) -> Result<Protocol, ConfigError> {
        Protocol::new(
            self.protocol.version,
            self.protocol.board_id,
            self.protocol.word_size,
        )
    }

    /// Packet layout described by `[packet]`. A configured schema overrides
    /// `task_id_width`.
    pub fn layout(&self, protocol: &Protocol) -> Result<Layout, ConfigError> {
        let width = match &self.packet.schema {
            Some(path) => TaskSchema::load(path)?.task_id_width(),
            None => self.packet.task_id_width,
        };
        let kind = match self.packet.kind {
            PacketKindConfig::Basic => PacketKind::Basic,
            PacketKindConfig::Framed => PacketKind::Framed(self.packet.checksum),
        };
        Ok(Layout::new(protocol, kind, self.packet.size, width)?)
    }

    /// Apply ETASK_* env var overrides. Unparseable values are ignored.
    fn apply_env_overrides(&mut self) {
        if let Some(n) = env_override("ETASK_PROTOCOL__VERSION") {
            self.protocol.version = n;
        }
        if let Some(n) = env_override("ETASK_PROTOCOL__BOARD_ID") {
            self.protocol.board_id = n;
        }
        if let Some(n) = env_override("ETASK_PROTOCOL__WORD_SIZE") {
            self.protocol.word_size = n;
        }
        if let Some(c) = env_override("ETASK_PACKET__CHECKSUM") {
            self.packet.checksum = c;
        }
    }
}

fn env_override<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = std::env::var(key).ok()?;
    match value.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %value, "ignoring invalid environment override");
            None
        }
    }
}
