use crate::*;

use std::path::PathBuf;

use etask_core::{
    Checksum, ConfigError, EtaskConfig, HeaderType, PacketKind, StatusCode, TaskIdWidth,
    TaskSchema,
};

/// Scratch directory removed on drop.
struct Scratch(PathBuf);

impl Scratch {
    fn new(tag: &str) -> Self {
        let dir = std::env::temp_dir().join(format!("etask-it-{tag}-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("scratch dir");
        Self(dir)
    }

    fn write(&self, name: &str, text: &str) -> PathBuf {
        let path = self.0.join(name);
        std::fs::write(&path, text).expect("scratch file");
        path
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.0);
    }
}

fn schema_json() -> String {
    serde_json::json!({
        "blink": { "uid": 1, "params": { "period_ms": "u32" }, "return": {} },
        "probe": { "uid": "300", "params": {}, "return": { "value": "f32" } }
    })
    .to_string()
}

fn config_toml(schema: &std::path::Path) -> String {
    format!(
        r#"
[protocol]
version = 2
board_id = 5
word_size = 8

[packet]
kind = "framed"
size = 24
task_id_width = 1
checksum = "crc32"
schema = "{}"

[[transports]]
name = "bench"
kind = "tcp"
address = "127.0.0.1:7000"
"#,
        schema.display()
    )
}

#[test]
fn test_config_and_schema_drive_the_codec() {
    let scratch = Scratch::new("pipeline");
    let schema_path = scratch.write("tasks.json", &schema_json());
    let config_path = scratch.write("config.toml", &config_toml(&schema_path));

    let config = EtaskConfig::load_from(&config_path).unwrap();
    let protocol = config.protocol().unwrap();
    assert_eq!(protocol.version(), 2);
    assert_eq!(protocol.board_id(), 5);
    assert_eq!(config.transports.len(), 1);

    // Largest uid is 300, so the schema widens the configured one-byte field.
    let layout = config.layout(&protocol).unwrap();
    assert_eq!(layout.kind(), PacketKind::Framed(Checksum::Crc32));
    assert_eq!(layout.task_id_width(), TaskIdWidth::U16);
    assert_eq!(layout.payload_size(), 24 - 4 - 1 - 2 - 4);

    let schema = TaskSchema::load(&schema_path).unwrap();
    let probe = schema.get("probe").unwrap().uid;

    let header = Header::from_fields(
        &protocol,
        HeaderFields {
            kind: HeaderType::Control,
            priority: 3,
            receiver_id: 9,
            ..Default::default()
        },
    );
    let mut packet = Packet::new(layout, header, probe, StatusCode::Ok.as_u8(), b"read").unwrap();
    validator::seal(&mut packet).unwrap();
    let wire = packet.to_bytes();
    assert_eq!(wire.len(), 24);

    let decoded = Packet::from_bytes(&wire, layout).unwrap();
    assert!(validator::is_valid(&decoded));
    assert_eq!(decoded, packet);
    assert_eq!(decoded.task_id(), 300);
    assert_eq!(decoded.header().version(), 2);
    assert_eq!(decoded.header().sender_id(), 5);
    assert_eq!(decoded.header().receiver_id(), 9);
    assert_eq!(decoded.header().kind(), HeaderType::Control);
    assert_eq!(&decoded.payload()[..4], b"read");

    let mut tampered = wire.clone();
    tampered[10] ^= 0x40;
    let tampered = Packet::from_bytes(&tampered, layout).unwrap();
    assert!(!validator::is_valid(&tampered));
}

#[test]
fn test_broken_schema_surfaces_through_config() {
    let scratch = Scratch::new("broken");
    let schema_path = scratch.write("tasks.json", r#"{ "blink": { "params": {}, "return": {} } }"#);
    let config_path = scratch.write("config.toml", &config_toml(&schema_path));

    let config = EtaskConfig::load_from(&config_path).unwrap();
    let protocol = config.protocol().unwrap();
    let err = config.layout(&protocol).unwrap_err();
    assert!(matches!(err, ConfigError::Schema(_)), "{err}");
}

#[test]
fn test_misaligned_size_is_rejected_by_config() {
    let scratch = Scratch::new("aligned");
    let config_path = scratch.write(
        "config.toml",
        "[protocol]\nword_size = 8\n\n[packet]\nkind = \"basic\"\nsize = 20\ntask_id_width = 2\n",
    );

    let config = EtaskConfig::load_from(&config_path).unwrap();
    let protocol = config.protocol().unwrap();
    let err = config.layout(&protocol).unwrap_err();
    assert!(matches!(err, ConfigError::InvalidPacket(_)), "{err}");
}
