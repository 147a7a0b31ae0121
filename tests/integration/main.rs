//! etask integration test harness.
//!
//! Tests drive real loopback TCP. Each remote board is a listener task on
//! 127.0.0.1 with an OS-assigned port, so tests can run in parallel.
//!
//!   cargo test --test integration

mod hub_tcp;
mod pipeline;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use etask_core::{validator, Header, HeaderFields, Layout, Packet, Protocol};

// ── Harness ───────────────────────────────────────────────────────────────────

/// How long a test waits for something that should arrive.
pub const ARRIVAL: Duration = Duration::from_secs(2);
/// How long a test waits to be sure something does not arrive.
pub const SILENCE: Duration = Duration::from_millis(100);

enum ToBoard {
    Frame(Vec<u8>),
    Hangup,
}

/// A simulated remote board behind a TCP listener.
///
/// It accepts one connection at a time, reports every complete frame it
/// reads, and writes whatever the test pushes. The listener task is aborted
/// on drop, even when the test panics.
pub struct RemoteBoard {
    pub addr: String,
    accepted: Arc<AtomicUsize>,
    inbound: mpsc::UnboundedReceiver<Vec<u8>>,
    outbound: mpsc::UnboundedSender<ToBoard>,
    task: JoinHandle<()>,
}

impl RemoteBoard {
    pub async fn spawn(frame: usize) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind loopback listener")?;
        let addr = listener.local_addr()?.to_string();
        let accepted = Arc::new(AtomicUsize::new(0));
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel();

        let counter = accepted.clone();
        let task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let (mut rd, mut wr) = stream.into_split();
                let mut acc = Vec::new();
                loop {
                    tokio::select! {
                        n = rd.read_buf(&mut acc) => {
                            match n {
                                Ok(0) | Err(_) => break,
                                Ok(_) => {
                                    while acc.len() >= frame {
                                        let _ = inbound_tx.send(acc.drain(..frame).collect());
                                    }
                                }
                            }
                        }
                        cmd = outbound_rx.recv() => match cmd {
                            Some(ToBoard::Frame(bytes)) => {
                                if wr.write_all(&bytes).await.is_err() {
                                    break;
                                }
                            }
                            Some(ToBoard::Hangup) => break,
                            None => return,
                        }
                    }
                }
            }
        });

        Ok(Self {
            addr,
            accepted,
            inbound,
            outbound,
            task,
        })
    }

    /// Queue bytes for the current (or next) connection.
    pub fn push(&self, bytes: Vec<u8>) {
        let _ = self.outbound.send(ToBoard::Frame(bytes));
    }

    /// Drop the current connection.
    pub fn hangup(&self) {
        let _ = self.outbound.send(ToBoard::Hangup);
    }

    /// Next frame the board read, or `None` if nothing arrives in time.
    pub async fn next_frame(&mut self, wait: Duration) -> Option<Vec<u8>> {
        tokio::time::timeout(wait, self.inbound.recv()).await.ok().flatten()
    }

    /// Connections accepted so far.
    pub fn connections(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

impl Drop for RemoteBoard {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Sealed wire image of a packet from `from` to `to` under `layout`.
pub fn frame(protocol: &Protocol, layout: Layout, to: u8, task_id: u64, payload: &[u8]) -> Vec<u8> {
    let header = Header::from_fields(
        protocol,
        HeaderFields {
            receiver_id: to,
            ..Default::default()
        },
    );
    let mut packet = Packet::new(layout, header, task_id, 0, payload).expect("valid test packet");
    validator::seal(&mut packet).expect("sealable test packet");
    packet.to_bytes()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_remote_board_echoes_frames() {
    let mut board = RemoteBoard::spawn(4).await.expect("board should start");
    let mut stream = tokio::net::TcpStream::connect(&board.addr).await.unwrap();
    stream.write_all(b"abcdefgh").await.unwrap();
    assert_eq!(board.next_frame(ARRIVAL).await.unwrap(), b"abcd");
    assert_eq!(board.next_frame(ARRIVAL).await.unwrap(), b"efgh");

    board.push(b"xy".to_vec());
    let mut buf = [0u8; 2];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(&buf, b"xy");
    assert_eq!(board.connections(), 1);
}
