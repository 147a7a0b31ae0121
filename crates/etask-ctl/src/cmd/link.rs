//! Live transport commands: send, recv.

use std::sync::Arc;

use anyhow::{bail, Context, Result};

use etask_core::config::{TransportConfig, TransportEndpoint};
use etask_core::{EtaskConfig, Protocol};
use etask_link::{Connector, Hub, Interface, TcpConnector};

use super::args::PacketArgs;
use super::codec::print_packet;

fn connector(transport: &TransportConfig) -> Result<Box<dyn Connector>> {
    match &transport.endpoint {
        TransportEndpoint::Tcp { address, keepalive } => {
            Ok(Box::new(TcpConnector::new(address.clone()).with_keepalive(*keepalive)))
        }
        #[cfg(feature = "serial")]
        TransportEndpoint::Serial { path, baud } => {
            Ok(Box::new(etask_link::SerialConnector::new(path.clone(), *baud)))
        }
        #[cfg(not(feature = "serial"))]
        TransportEndpoint::Serial { .. } => bail!(
            "transport {:?} is a serial line; rebuild with --features serial",
            transport.name
        ),
    }
}

/// Hub over every configured transport, with roles taken from the config.
fn build_hub(config: &EtaskConfig, protocol: &Protocol) -> Result<Hub> {
    if config.transports.is_empty() {
        bail!("no [[transports]] configured");
    }
    let mut interfaces = Vec::with_capacity(config.transports.len());
    for transport in &config.transports {
        let link = connector(transport)?;
        interfaces.push(Arc::new(Interface::from_boxed(transport.name.clone(), *protocol, link)));
    }
    let hub = Hub::new(interfaces)?;
    for (iface, transport) in hub.interfaces().iter().zip(&config.transports) {
        if !transport.send {
            hub.disable_sender(iface)?;
        }
        if !transport.receive {
            hub.disable_receiver(iface)?;
        }
    }
    Ok(hub)
}

pub async fn cmd_send(config: &EtaskConfig, protocol: &Protocol, args: &PacketArgs) -> Result<()> {
    let mut packet = args.packet(config, protocol)?;
    let hub = build_hub(config, protocol)?;
    let result = hub.send(&mut packet).await;
    hub.close_all().await;
    result.context("send failed")?;
    println!("sent {}", hex::encode(packet.to_bytes()));
    Ok(())
}

pub async fn cmd_recv(config: &EtaskConfig, protocol: &Protocol, args: &PacketArgs) -> Result<()> {
    let layout = args.layout(config, protocol)?;
    let hub = build_hub(config, protocol)?;
    let result = tokio::select! {
        r = hub.try_receive(layout.kind(), layout.total_size(), layout.task_id_width()) => r,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Ok(None)
        }
    };
    hub.close_all().await;
    match result? {
        Some(packet) => print_packet(&packet),
        None => println!("no packet"),
    }
    Ok(())
}
