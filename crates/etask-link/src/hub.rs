//! Hub: fan-out and fan-in over a fixed set of interfaces.
//!
//! Membership is fixed at construction. Each member can be toggled as a
//! sender and as a receiver independently; both roles start enabled.
//!
//! Neither direction applies timeouts. Dropping a pending `send` or
//! `try_receive` drops every per-interface future it started, so no work
//! outlives the call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::{join_all, try_join_all};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;

use etask_core::{validator, Layout, Packet, PacketKind, TaskIdWidth};

use crate::error::LinkError;
use crate::interface::Interface;

pub struct Hub {
    interfaces: Vec<Arc<Interface>>,
    senders: Vec<AtomicBool>,
    receivers: Vec<AtomicBool>,
}

impl Hub {
    pub fn new(interfaces: Vec<Arc<Interface>>) -> Result<Self, LinkError> {
        if interfaces.is_empty() {
            return Err(LinkError::NoInterfaces);
        }
        let enabled = || -> Vec<AtomicBool> { interfaces.iter().map(|_| AtomicBool::new(true)).collect() };
        Ok(Self {
            senders: enabled(),
            receivers: enabled(),
            interfaces,
        })
    }

    pub fn interfaces(&self) -> &[Arc<Interface>] {
        &self.interfaces
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    /// Always false; a hub cannot be built empty.
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    // ── Roles ─────────────────────────────────────────────────────────────────

    fn index_of(&self, iface: &Interface) -> Result<usize, LinkError> {
        self.interfaces
            .iter()
            .position(|member| std::ptr::eq(Arc::as_ptr(member), iface))
            .ok_or_else(|| LinkError::UnknownInterface(iface.name().to_string()))
    }

    fn set_role(&self, role: &[AtomicBool], iface: &Interface, enabled: bool) -> Result<(), LinkError> {
        let index = self.index_of(iface)?;
        role[index].store(enabled, Ordering::SeqCst);
        Ok(())
    }

    pub fn enable_sender(&self, iface: &Interface) -> Result<(), LinkError> {
        self.set_role(&self.senders, iface, true)
    }

    pub fn disable_sender(&self, iface: &Interface) -> Result<(), LinkError> {
        self.set_role(&self.senders, iface, false)
    }

    pub fn enable_receiver(&self, iface: &Interface) -> Result<(), LinkError> {
        self.set_role(&self.receivers, iface, true)
    }

    pub fn disable_receiver(&self, iface: &Interface) -> Result<(), LinkError> {
        self.set_role(&self.receivers, iface, false)
    }

    pub fn is_sender_enabled(&self, iface: &Interface) -> Result<bool, LinkError> {
        Ok(self.senders[self.index_of(iface)?].load(Ordering::SeqCst))
    }

    pub fn is_receiver_enabled(&self, iface: &Interface) -> Result<bool, LinkError> {
        Ok(self.receivers[self.index_of(iface)?].load(Ordering::SeqCst))
    }

    fn enabled<'a>(&'a self, role: &'a [AtomicBool]) -> impl Iterator<Item = (usize, &'a Arc<Interface>)> + 'a {
        self.interfaces
            .iter()
            .enumerate()
            .filter(move |(index, _)| role[*index].load(Ordering::SeqCst))
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Open every interface concurrently. Reports the first failure after
    /// all attempts have finished.
    pub async fn open_all(&self) -> Result<(), LinkError> {
        let results = join_all(self.interfaces.iter().map(|iface| iface.open())).await;
        results.into_iter().collect()
    }

    /// Close every interface concurrently. Failures are logged, never returned.
    pub async fn close_all(&self) {
        let results = join_all(self.interfaces.iter().map(|iface| iface.close())).await;
        for (iface, result) in self.interfaces.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(interface = iface.name(), error = %e, "close failed");
            }
        }
    }

    // ── Traffic ───────────────────────────────────────────────────────────────

    /// Seal `packet` and write it to every enabled sender concurrently.
    ///
    /// The first failure cancels the sends still in flight and is returned.
    pub async fn send(&self, packet: &mut Packet) -> Result<(), LinkError> {
        if let PacketKind::Framed(_) = packet.kind() {
            validator::seal(packet)?;
        }
        let packet = &*packet;
        let sends = self.enabled(&self.senders).map(|(_, iface)| {
            let mut copy = packet.clone();
            async move { iface.send(&mut copy).await }
        });
        let sent = try_join_all(sends).await?;
        tracing::debug!(interfaces = sent.len(), task_id = packet.task_id(), "packet fanned out");
        Ok(())
    }

    /// Race every enabled receiver for the first accepted packet.
    ///
    /// Interfaces that fail or deliver nothing usable drop out of the race.
    /// Once a winner exists, other attempts that are already complete are
    /// collected and the lowest interface index wins; everything still
    /// pending is cancelled before returning.
    pub async fn try_receive(
        &self,
        kind: PacketKind,
        total_size: usize,
        task_id_width: TaskIdWidth,
    ) -> Result<Option<Packet>, LinkError> {
        let attempts = self
            .enabled(&self.receivers)
            .map(|(index, iface)| {
                Layout::new(iface.protocol(), kind, total_size, task_id_width)
                    .map(|layout| (index, iface, layout))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if attempts.is_empty() {
            return Ok(None);
        }

        let mut race: FuturesUnordered<_> = attempts
            .into_iter()
            .map(|(index, iface, layout)| async move { (index, iface.receive(layout).await) })
            .collect();

        let mut winner = None;
        while let Some((index, result)) = race.next().await {
            if let Some(packet) = self.settle(index, result) {
                winner = Some((index, packet));
                break;
            }
        }
        let Some((mut best, mut packet)) = winner else {
            return Ok(None);
        };

        while let Some(Some((index, result))) = race.next().now_or_never() {
            if let Some(candidate) = self.settle(index, result) {
                if index < best {
                    best = index;
                    packet = candidate;
                }
            }
        }
        drop(race);

        tracing::trace!(interface = self.interfaces[best].name(), task_id = packet.task_id(), "race won");
        Ok(Some(packet))
    }

    fn settle(&self, index: usize, result: Result<Option<Packet>, LinkError>) -> Option<Packet> {
        let name = self.interfaces[index].name();
        match result {
            Ok(Some(packet)) => Some(packet),
            Ok(None) => {
                tracing::trace!(interface = name, "no packet, leaving race");
                None
            }
            Err(e) => {
                tracing::debug!(interface = name, error = %e, "receive failed, leaving race");
                None
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::LinkState;
    use crate::memory::{memory_link, memory_link_with_capacity, MemoryPeer};
    use etask_core::{Checksum, Header, HeaderFields, Protocol};
    use std::time::Duration;

    const KIND: PacketKind = PacketKind::Framed(Checksum::Crc32);
    const SIZE: usize = 24;
    const WIDTH: TaskIdWidth = TaskIdWidth::U32;
    const LOCAL: u8 = 1;

    fn board(id: u8) -> Protocol {
        Protocol::new(0, id, 8).unwrap()
    }

    fn hub_of(names: &[&str]) -> (Hub, Vec<MemoryPeer>) {
        let (interfaces, peers): (Vec<_>, Vec<_>) = names
            .iter()
            .map(|name| {
                let (connector, peer) = memory_link(*name);
                (Arc::new(Interface::new(*name, board(LOCAL), connector)), peer)
            })
            .unzip();
        (Hub::new(interfaces).unwrap(), peers)
    }

    fn packet(from: u8, to: u8, task_id: u64) -> Packet {
        let protocol = board(from);
        let layout = Layout::new(&protocol, KIND, SIZE, WIDTH).unwrap();
        let header = Header::from_fields(&protocol, HeaderFields { receiver_id: to, ..Default::default() });
        Packet::new(layout, header, task_id, 0, b"telemetry").unwrap()
    }

    fn sealed(from: u8, to: u8, task_id: u64) -> Vec<u8> {
        let mut p = packet(from, to, task_id);
        validator::seal(&mut p).unwrap();
        p.to_bytes()
    }

    async fn nothing_arrives(peer: &mut MemoryPeer) -> bool {
        tokio::time::timeout(Duration::from_millis(50), peer.read_exact(1))
            .await
            .is_err()
    }

    #[test]
    fn empty_hub_is_rejected() {
        assert!(matches!(Hub::new(Vec::new()), Err(LinkError::NoInterfaces)));
    }

    #[test]
    fn roles_default_on_and_reject_strangers() {
        let (hub, _peers) = hub_of(&["a", "b"]);
        let a = hub.interfaces()[0].clone();
        assert!(hub.is_sender_enabled(&a).unwrap());
        assert!(hub.is_receiver_enabled(&a).unwrap());
        hub.disable_receiver(&a).unwrap();
        assert!(hub.is_sender_enabled(&a).unwrap());
        assert!(!hub.is_receiver_enabled(&a).unwrap());

        // Same name, different interface.
        let (connector, _peer) = memory_link("a");
        let stranger = Interface::new("a", board(LOCAL), connector);
        assert!(matches!(
            hub.enable_sender(&stranger),
            Err(LinkError::UnknownInterface(name)) if name == "a"
        ));
    }

    #[tokio::test]
    async fn fan_out_skips_disabled_senders() {
        let (hub, mut peers) = hub_of(&["a", "b"]);
        hub.open_all().await.unwrap();
        hub.disable_sender(&hub.interfaces()[0]).unwrap();

        let mut p = packet(LOCAL, 9, 77);
        hub.send(&mut p).await.unwrap();
        assert!(validator::is_valid(&p));

        let expected = sealed(LOCAL, 9, 77);
        assert_eq!(peers[1].read_exact(SIZE).await.unwrap(), expected);
        assert!(nothing_arrives(&mut peers[0]).await);
    }

    #[tokio::test]
    async fn send_failure_is_reported() {
        let (hub, mut peers) = hub_of(&["a", "b"]);
        peers[1].refuse_connections(true);
        let err = hub.send(&mut packet(LOCAL, 9, 1)).await.unwrap_err();
        assert!(matches!(err, LinkError::Connect { ref endpoint, .. } if endpoint == "b"));
        assert_eq!(peers[0].read_exact(SIZE).await.unwrap(), sealed(LOCAL, 9, 1));
    }

    #[tokio::test]
    async fn failed_fan_out_leaves_no_torn_frame_behind() {
        // a: a pipe too small for one frame, so its send is still writing
        // when b's refusal ends the fan-out.
        let (slow, mut a) = memory_link_with_capacity("a", 4);
        let (refusing, b) = memory_link("b");
        b.refuse_connections(true);
        let hub = Hub::new(vec![
            Arc::new(Interface::new("a", board(LOCAL), slow)),
            Arc::new(Interface::new("b", board(LOCAL), refusing)),
        ])
        .unwrap();
        hub.interfaces()[0].open().await.unwrap();

        let err = hub.send(&mut packet(LOCAL, 9, 1)).await.unwrap_err();
        assert!(matches!(err, LinkError::Connect { ref endpoint, .. } if endpoint == "b"));
        assert_eq!(hub.interfaces()[0].state(), LinkState::Closed);

        // The cut-off stream carries a prefix and then ends.
        a.accept().await.unwrap();
        assert_eq!(a.read_exact(4).await.unwrap(), &sealed(LOCAL, 9, 1)[..4]);
        assert!(a.read_exact(1).await.is_err());

        hub.disable_sender(&hub.interfaces()[1]).unwrap();
        let mut pkt = packet(LOCAL, 9, 2);
        let (sent, frame) = tokio::join!(hub.send(&mut pkt), async {
            a.accept().await.unwrap();
            a.read_exact(SIZE).await.unwrap()
        });
        sent.unwrap();
        assert_eq!(frame, sealed(LOCAL, 9, 2));
        assert_eq!(a.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn race_returns_first_valid_and_cancels_the_rest() {
        let (hub, mut peers) = hub_of(&["a", "b"]);
        hub.open_all().await.unwrap();
        peers[1].write(&sealed(7, LOCAL, 2)).await.unwrap();

        let got = hub.try_receive(KIND, SIZE, WIDTH).await.unwrap().unwrap();
        assert_eq!(got.task_id(), 2);
        assert_eq!(got.header().sender_id(), 7);

        // The loser was parked on a read. It must be gone, and a frame that
        // arrives later is still delivered whole.
        peers[0].write(&sealed(7, LOCAL, 3)).await.unwrap();
        let a = &hub.interfaces()[0];
        let late = tokio::time::timeout(Duration::from_secs(1), a.try_receive(KIND, SIZE, WIDTH))
            .await
            .expect("loser still holds the read side")
            .unwrap()
            .unwrap();
        assert_eq!(late.task_id(), 3);
    }

    #[tokio::test]
    async fn simultaneous_winners_resolve_to_lowest_index() {
        let (hub, mut peers) = hub_of(&["a", "b", "c"]);
        hub.open_all().await.unwrap();
        for (i, peer) in peers.iter_mut().enumerate() {
            peer.write(&sealed(7, LOCAL, 10 + i as u64)).await.unwrap();
        }
        let got = hub.try_receive(KIND, SIZE, WIDTH).await.unwrap().unwrap();
        assert_eq!(got.task_id(), 10);
    }

    #[tokio::test]
    async fn foreign_and_broken_frames_drop_out() {
        let (hub, mut peers) = hub_of(&["a", "b", "c"]);
        hub.open_all().await.unwrap();
        // a: addressed elsewhere; b: link dies; c: valid but later.
        peers[0].write(&sealed(7, LOCAL + 1, 1)).await.unwrap();
        peers[1].accept().await.unwrap();
        peers[1].disconnect();

        let race = hub.try_receive(KIND, SIZE, WIDTH);
        let feed = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            peers[2].write(&sealed(7, LOCAL, 3)).await.unwrap();
        };
        let (got, ()) = tokio::join!(race, feed);
        assert_eq!(got.unwrap().unwrap().task_id(), 3);
        assert_eq!(hub.interfaces()[1].state(), LinkState::Closed);
    }

    #[tokio::test]
    async fn race_with_no_usable_frame_is_no_packet() {
        let (hub, mut peers) = hub_of(&["a", "b"]);
        hub.open_all().await.unwrap();
        let mut corrupt = sealed(7, LOCAL, 1);
        corrupt[6] ^= 0x10;
        peers[0].write(&corrupt).await.unwrap();
        peers[1].write(&sealed(7, 99, 1)).await.unwrap();
        assert!(hub.try_receive(KIND, SIZE, WIDTH).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_receivers_means_no_work() {
        let (hub, peers) = hub_of(&["a"]);
        hub.disable_receiver(&hub.interfaces()[0]).unwrap();
        assert!(hub.try_receive(KIND, SIZE, WIDTH).await.unwrap().is_none());
        assert_eq!(peers[0].connect_attempts(), 0);
    }

    #[tokio::test]
    async fn bad_layout_fails_fast() {
        let (hub, peers) = hub_of(&["a"]);
        let err = hub.try_receive(KIND, SIZE + 1, WIDTH).await.unwrap_err();
        assert!(matches!(err, LinkError::Layout(_)));
        assert_eq!(peers[0].connect_attempts(), 0);
    }

    #[tokio::test]
    async fn close_all_is_best_effort_and_reopen_works() {
        let (hub, peers) = hub_of(&["a", "b"]);
        hub.open_all().await.unwrap();
        hub.close_all().await;
        assert!(hub.interfaces().iter().all(|i| i.state() == LinkState::Closed));

        peers[1].refuse_connections(true);
        assert!(hub.open_all().await.is_err());
        assert!(hub.interfaces()[0].is_open());
        hub.close_all().await;

        peers[1].refuse_connections(false);
        hub.open_all().await.unwrap();
        assert_eq!(peers[0].connect_attempts(), 3);
        assert_eq!(peers[1].connect_attempts(), 3);
    }
}
