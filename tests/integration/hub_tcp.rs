use crate::*;

use std::sync::Arc;

use etask_core::{Checksum, Header, HeaderFields, Layout, Packet, PacketKind, Protocol, TaskIdWidth};
use etask_link::{Hub, Interface, LinkState, TcpConnector};

const KIND: PacketKind = PacketKind::Framed(Checksum::Crc16);
const SIZE: usize = 16;
const WIDTH: TaskIdWidth = TaskIdWidth::U16;
const LOCAL: u8 = 1;
const REMOTE: u8 = 20;

fn local() -> Protocol {
    Protocol::new(1, LOCAL, 8).unwrap()
}

fn remote() -> Protocol {
    local().with_board_id(REMOTE)
}

fn layout() -> Layout {
    Layout::new(&local(), KIND, SIZE, WIDTH).unwrap()
}

async fn boards(n: usize) -> (Hub, Vec<RemoteBoard>) {
    let mut boards = Vec::new();
    let mut interfaces = Vec::new();
    for i in 0..n {
        let board = RemoteBoard::spawn(SIZE).await.expect("board should start");
        let connector = TcpConnector::new(board.addr.clone()).with_keepalive(true);
        interfaces.push(Arc::new(Interface::new(format!("tcp{i}"), local(), connector)));
        boards.push(board);
    }
    (Hub::new(interfaces).unwrap(), boards)
}

#[tokio::test]
async fn test_fan_out_reaches_enabled_senders_only() {
    let (hub, mut boards) = boards(2).await;
    hub.open_all().await.unwrap();
    hub.disable_sender(&hub.interfaces()[0]).unwrap();

    let header = Header::from_fields(&local(), HeaderFields { receiver_id: REMOTE, ..Default::default() });
    let mut packet = Packet::new(layout(), header, 0x0102, 0, b"go").unwrap();
    hub.send(&mut packet).await.unwrap();

    let expected = frame(&local(), layout(), REMOTE, 0x0102, b"go");
    assert_eq!(packet.to_bytes(), expected);
    assert_eq!(boards[1].next_frame(ARRIVAL).await, Some(expected));
    assert_eq!(boards[0].next_frame(SILENCE).await, None);

    hub.close_all().await;
}

#[tokio::test]
async fn test_race_picks_the_board_that_answers() {
    let (hub, boards) = boards(2).await;
    hub.open_all().await.unwrap();
    boards[1].push(frame(&remote(), layout(), LOCAL, 9, b"pong"));

    let got = tokio::time::timeout(ARRIVAL, hub.try_receive(KIND, SIZE, WIDTH))
        .await
        .expect("race should resolve")
        .unwrap()
        .expect("valid packet");
    assert_eq!(got.task_id(), 9);
    assert_eq!(got.header().sender_id(), REMOTE);
    assert_eq!(&got.payload()[..4], b"pong");

    // The silent board's attempt was cancelled; its link is still usable.
    boards[0].push(frame(&remote(), layout(), LOCAL, 10, b"late"));
    let late = tokio::time::timeout(ARRIVAL, hub.interfaces()[0].try_receive(KIND, SIZE, WIDTH))
        .await
        .expect("late frame should arrive")
        .unwrap()
        .unwrap();
    assert_eq!(late.task_id(), 10);
}

#[tokio::test]
async fn test_foreign_traffic_is_filtered() {
    let (hub, boards) = boards(1).await;
    hub.open_all().await.unwrap();
    boards[0].push(frame(&remote(), layout(), LOCAL + 1, 1, b""));
    boards[0].push(frame(&remote(), layout(), LOCAL, 2, b""));

    assert!(hub.try_receive(KIND, SIZE, WIDTH).await.unwrap().is_none());
    let got = hub.try_receive(KIND, SIZE, WIDTH).await.unwrap().unwrap();
    assert_eq!(got.task_id(), 2);
}

#[tokio::test]
async fn test_hangup_closes_then_send_reconnects() {
    let (hub, mut boards) = boards(1).await;
    hub.open_all().await.unwrap();
    boards[0].hangup();

    // The only receiver fails, so the race yields nothing and the link is closed.
    assert!(hub.try_receive(KIND, SIZE, WIDTH).await.unwrap().is_none());
    let iface = &hub.interfaces()[0];
    assert_eq!(iface.state(), LinkState::Closed);

    let header = Header::from_fields(&local(), HeaderFields { receiver_id: REMOTE, ..Default::default() });
    let mut packet = Packet::new(layout(), header, 3, 0, b"again").unwrap();
    hub.send(&mut packet).await.unwrap();
    assert!(iface.is_open());
    assert_eq!(boards[0].next_frame(ARRIVAL).await, Some(packet.to_bytes()));
    assert_eq!(boards[0].connections(), 2);
}

#[tokio::test]
async fn test_unreachable_board_fails_send_until_disabled() {
    let (hub, _boards) = boards(1).await;
    let dead = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let stranded = Arc::new(Interface::new("dead", local(), TcpConnector::new(dead)));
    let mut members = hub.interfaces().to_vec();
    members.push(stranded.clone());
    let hub = Hub::new(members).unwrap();

    assert!(hub.open_all().await.is_err());
    assert_eq!(stranded.state(), LinkState::Closed);

    let mut packet = Packet::new(layout(), Header::from_raw(&local(), 0, REMOTE), 1, 0, b"").unwrap();
    let err = hub.send(&mut packet).await.unwrap_err();
    assert!(err.is_transport());

    hub.disable_sender(&stranded).unwrap();
    hub.send(&mut packet).await.unwrap();
}
