//! In-process connector for tests and simulations.
//!
//! [`memory_link`] returns a connector and the peer that sits on the far
//! side of every stream it produces. The peer sees each connection attempt,
//! can refuse them, and can drop the current stream to simulate a fault.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

use crate::connector::{BoxedStream, Connector};

const PIPE_CAPACITY: usize = 64 * 1024;

#[derive(Default)]
struct Shared {
    attempts: AtomicUsize,
    refuse: AtomicBool,
}

pub struct MemoryConnector {
    name: String,
    capacity: usize,
    shared: Arc<Shared>,
    accept_tx: mpsc::UnboundedSender<DuplexStream>,
}

pub struct MemoryPeer {
    shared: Arc<Shared>,
    accept_rx: mpsc::UnboundedReceiver<DuplexStream>,
    current: Option<DuplexStream>,
}

/// New connector/peer pair named `name`.
pub fn memory_link(name: impl Into<String>) -> (MemoryConnector, MemoryPeer) {
    memory_link_with_capacity(name, PIPE_CAPACITY)
}

/// Like [`memory_link`], with `capacity` bytes buffered per direction. A
/// writer that outruns the peer by more than that suspends.
pub fn memory_link_with_capacity(
    name: impl Into<String>,
    capacity: usize,
) -> (MemoryConnector, MemoryPeer) {
    let shared = Arc::new(Shared::default());
    let (accept_tx, accept_rx) = mpsc::unbounded_channel();
    (
        MemoryConnector {
            name: name.into(),
            capacity,
            shared: shared.clone(),
            accept_tx,
        },
        MemoryPeer {
            shared,
            accept_rx,
            current: None,
        },
    )
}

impl Connector for MemoryConnector {
    fn endpoint(&self) -> &str {
        &self.name
    }

    fn connect(&self) -> BoxFuture<'_, io::Result<BoxedStream>> {
        Box::pin(async move {
            self.shared.attempts.fetch_add(1, Ordering::SeqCst);
            if self.shared.refuse.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused by peer"));
            }
            let (near, far) = tokio::io::duplex(self.capacity);
            self.accept_tx
                .send(far)
                .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "peer dropped"))?;
            Ok(Box::new(near) as BoxedStream)
        })
    }
}

impl MemoryPeer {
    /// Wait for the next connection and make it current.
    pub async fn accept(&mut self) -> io::Result<()> {
        let stream = self
            .accept_rx
            .recv()
            .await
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "connector dropped"))?;
        self.current = Some(stream);
        Ok(())
    }

    async fn stream(&mut self) -> io::Result<&mut DuplexStream> {
        if self.current.is_none() {
            self.accept().await?;
        }
        self.current
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotConnected))
    }

    /// Write to the current stream, accepting one first if needed.
    pub async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self.stream().await?;
        stream.write_all(bytes).await?;
        stream.flush().await
    }

    pub async fn read_exact(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let stream = self.stream().await?;
        let mut buf = vec![0u8; n];
        stream.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Drop the current stream. The other side sees EOF.
    pub fn disconnect(&mut self) {
        self.current = None;
    }

    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of connect calls seen so far, refused ones included.
    pub fn connect_attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}
