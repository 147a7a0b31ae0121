//! etask-ctl — command-line front end for the etask codec and transports.

mod cmd;

use std::path::PathBuf;

use anyhow::{Context, Result};

use etask_core::EtaskConfig;

fn print_usage() {
    println!("Usage: etask-ctl [--config <path>] <command> [options]");
    println!();
    println!("Commands:");
    println!("  checksum <policy> <hex>        Compute a checksum over hex bytes");
    println!("  encode [packet options]        Print a sealed packet as hex");
    println!("  decode [packet options] <hex>  Parse and validate a packet");
    println!("  uid-width <schema.json>        Task-id width derived from a schema");
    println!("  send [packet options]          Send one packet on every configured sender");
    println!("  recv [packet options]          Wait for the first valid packet");
    println!("  config                         Show the resolved config");
    println!("  config init                    Write a default config if none exists");
    println!();
    println!("Packet options (defaults come from [packet] in the config):");
    println!("  --kind basic|framed   --size <bytes>   --width 1|2|4|8   --checksum <policy>");
    println!("  --task <id>   --status <code>   --receiver <id>   --type <name|0-15>");
    println!("  --priority <0-7>   --flags ack,error,heartbeat (repeatable)");
    println!("  --encrypted   --fragmented   --validated   --reserved");
    println!("  --payload <hex> | --payload-file <path>   --payload-fit pad|clip|error");
    println!();
    println!("Checksum policies: none sum8 sum16 sum32 crc8 crc16 crc32 crc64");
    println!("                   fletcher16 fletcher32 adler32 internet16");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --config option
    let mut config_path: Option<PathBuf> = None;
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--config" {
            i += 1;
            config_path = Some(args.get(i).context("--config requires a value")?.into());
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    let config_path = config_path.unwrap_or_else(EtaskConfig::file_path);
    let config = EtaskConfig::load_from(&config_path)?;
    let protocol = config.protocol()?;
    tracing::debug!(
        path = %config_path.display(),
        version = protocol.version(),
        board_id = protocol.board_id(),
        word_size = protocol.word_size(),
        "config loaded"
    );

    match remaining.as_slice() {
        ["checksum", policy, data] => cmd::codec::cmd_checksum(policy, data),
        ["encode", rest @ ..] => {
            let args = cmd::args::parse(rest)?;
            cmd::codec::cmd_encode(&config, &protocol, &args)
        }
        ["decode", rest @ ..] => {
            let args = cmd::args::parse(rest)?;
            cmd::codec::cmd_decode(&config, &protocol, &args)
        }
        ["uid-width", path] => cmd::schema::cmd_uid_width(path),
        ["send", rest @ ..] => {
            let args = cmd::args::parse(rest)?;
            cmd::link::cmd_send(&config, &protocol, &args).await
        }
        ["recv", rest @ ..] => {
            let args = cmd::args::parse(rest)?;
            cmd::link::cmd_recv(&config, &protocol, &args).await
        }
        ["config"] => cmd::config::cmd_show(&config, &config_path),
        ["config", "init"] => cmd::config::cmd_init(&config_path),
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
