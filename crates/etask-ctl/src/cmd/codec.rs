//! Offline codec commands: checksum, encode, decode.

use anyhow::{bail, Context, Result};

use etask_core::{checksum, validator, Checksum, EtaskConfig, Packet, Protocol, StatusCode};

use super::args::PacketArgs;

pub fn cmd_checksum(policy: &str, data: &str) -> Result<()> {
    let policy: Checksum = policy.parse()?;
    let bytes = hex::decode(data).context("data must be hex")?;
    let value = checksum::compute(policy, &bytes);
    println!("{policy}: {value:#0width$x}", width = policy.width() * 2 + 2);
    Ok(())
}

pub fn cmd_encode(config: &EtaskConfig, protocol: &Protocol, args: &PacketArgs) -> Result<()> {
    let mut packet = args.packet(config, protocol)?;
    validator::seal(&mut packet)?;
    println!("{}", hex::encode(packet.to_bytes()));
    Ok(())
}

pub fn cmd_decode(config: &EtaskConfig, protocol: &Protocol, args: &PacketArgs) -> Result<()> {
    let [data] = args.positional.as_slice() else {
        bail!("decode takes exactly one hex argument");
    };
    let raw = hex::decode(data).context("packet must be hex")?;
    let layout = args.layout(config, protocol)?;
    let packet = Packet::from_bytes(&raw, layout)?;
    print_packet(&packet);
    println!("  valid    : {}", validator::is_valid(&packet));
    Ok(())
}

pub fn print_packet(packet: &Packet) {
    let header = packet.header();
    println!("═══════════════════════════════════════");
    println!("  {}", packet.kind());
    println!("═══════════════════════════════════════");
    println!("  type     : {}", header.kind().name());
    println!("  version  : {}", header.version());
    println!("  priority : {}", header.priority());
    println!("  flags    : {:#05b}", header.flags().bits());
    println!(
        "  bits     : encrypted={} fragmented={} validated={} reserved={}",
        header.encrypted(),
        header.fragmented(),
        header.validated(),
        header.reserved()
    );
    println!("  sender   : {}", header.sender_id());
    println!("  receiver : {}", header.receiver_id());
    println!("  status   : {}", StatusCode::from_u8(packet.status_code()));
    println!("  task     : {:#x}", packet.task_id());
    println!("  payload  : {}", hex::encode(packet.payload()));
    if let Some(fcs) = packet.checksum() {
        println!("  fcs      : {fcs:#x}");
    }
}
