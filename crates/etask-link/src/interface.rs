//! Transport interface: one persistent, reconnectable link.
//!
//! State is either Closed or Open. Every operation opens lazily, and any I/O
//! fault drops the connection so the next call starts from scratch.
//!
//! The stream is split into independent read and write halves, so a receive
//! parked on the read side never blocks a send. Reads are cancellation safe:
//! bytes pulled off the stream are kept in a per-connection buffer until a
//! full frame is available, so dropping a pending receive loses nothing.
//! Writes are the opposite: a write abandoned midway has put part of a frame
//! on the stream, so the connection is dropped and the next call reconnects.
//!
//! Closing a link, or dropping it after a fault, wakes any receive still
//! parked on it with [`LinkError::NotConnected`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex as AsyncMutex};

use etask_core::{validator, Layout, Packet, PacketKind, Protocol, TaskIdWidth};

use crate::connector::{BoxedStream, Connector};
use crate::error::LinkError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Closed,
    Open,
}

struct Inbound {
    io: ReadHalf<BoxedStream>,
    buf: Vec<u8>,
    /// Flips to true once the connection is dropped.
    closed: watch::Receiver<bool>,
}

impl Inbound {
    async fn fill(&mut self, n: usize) -> std::io::Result<Vec<u8>> {
        if *self.closed.borrow() {
            return Err(std::io::ErrorKind::NotConnected.into());
        }
        while self.buf.len() < n {
            tokio::select! {
                biased;
                _ = self.closed.wait_for(|closed| *closed) => {
                    return Err(std::io::ErrorKind::NotConnected.into());
                }
                read = self.io.read_buf(&mut self.buf) => {
                    if read? == 0 {
                        return Err(std::io::ErrorKind::UnexpectedEof.into());
                    }
                }
            }
        }
        Ok(self.buf.drain(..n).collect())
    }
}

/// Handles to one live stream. Cloned out of the link so I/O never runs
/// under the state lock.
#[derive(Clone)]
struct Connection {
    generation: u64,
    reader: Arc<AsyncMutex<Inbound>>,
    writer: Arc<AsyncMutex<WriteHalf<BoxedStream>>>,
    closed: Arc<watch::Sender<bool>>,
}

impl Connection {
    /// Wake every receive parked on this connection.
    fn shut(&self) {
        self.closed.send_replace(true);
    }
}

/// Drops the connection unless disarmed. Held across a write, since a write
/// abandoned midway leaves a partial frame on the stream.
struct WriteGuard<'a> {
    iface: &'a Interface,
    generation: u64,
    armed: bool,
}

impl WriteGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!(interface = %self.iface.name, generation = self.generation, "write abandoned, dropping link");
            self.iface.drop_connection(self.generation);
        }
    }
}

#[derive(Default)]
struct Link {
    generation: u64,
    connection: Option<Connection>,
}

pub struct Interface {
    name: String,
    protocol: Protocol,
    connector: Box<dyn Connector>,
    /// Serializes open and close.
    connect_lock: AsyncMutex<()>,
    link: Mutex<Link>,
}

impl Interface {
    pub fn new(name: impl Into<String>, protocol: Protocol, connector: impl Connector + 'static) -> Self {
        Self::from_boxed(name, protocol, Box::new(connector))
    }

    pub fn from_boxed(name: impl Into<String>, protocol: Protocol, connector: Box<dyn Connector>) -> Self {
        Self {
            name: name.into(),
            protocol,
            connector,
            connect_lock: AsyncMutex::new(()),
            link: Mutex::new(Link::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &str {
        self.connector.endpoint()
    }

    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    pub fn state(&self) -> LinkState {
        match self.lock_link().connection {
            Some(_) => LinkState::Open,
            None => LinkState::Closed,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == LinkState::Open
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Idempotent. Concurrent callers share a single connection attempt.
    pub async fn open(&self) -> Result<(), LinkError> {
        self.connection().await.map(|_| ())
    }

    /// Idempotent and best-effort: the interface is Closed afterwards even
    /// when the teardown itself reports an error.
    pub async fn close(&self) -> Result<(), LinkError> {
        let _guard = self.connect_lock.lock().await;
        let taken = self.lock_link().connection.take();
        let Some(conn) = taken else {
            return Ok(());
        };
        tracing::debug!(interface = %self.name, generation = conn.generation, "closing link");
        conn.shut();

        // A writer busy with a send keeps its half until the send finishes;
        // the stream goes away once the last half is dropped.
        let result = match conn.writer.try_lock() {
            Ok(mut writer) => writer.shutdown().await,
            Err(_) => Ok(()),
        };
        result.map_err(|source| LinkError::Close {
            endpoint: self.endpoint().to_string(),
            source,
        })
    }

    async fn connection(&self) -> Result<Connection, LinkError> {
        if let Some(conn) = self.current() {
            return Ok(conn);
        }
        let _guard = self.connect_lock.lock().await;
        if let Some(conn) = self.current() {
            return Ok(conn);
        }

        let stream = self.connector.connect().await.map_err(|source| {
            tracing::warn!(interface = %self.name, error = %source, "connect failed");
            LinkError::Connect {
                endpoint: self.endpoint().to_string(),
                source,
            }
        })?;
        let (read, write) = tokio::io::split(stream);
        let (closed_tx, closed_rx) = watch::channel(false);

        let mut link = self.lock_link();
        link.generation += 1;
        let conn = Connection {
            generation: link.generation,
            reader: Arc::new(AsyncMutex::new(Inbound {
                io: read,
                buf: Vec::new(),
                closed: closed_rx,
            })),
            writer: Arc::new(AsyncMutex::new(write)),
            closed: Arc::new(closed_tx),
        };
        link.connection = Some(conn.clone());
        tracing::info!(interface = %self.name, endpoint = self.endpoint(), generation = conn.generation, "link open");
        Ok(conn)
    }

    fn current(&self) -> Option<Connection> {
        self.lock_link().connection.clone()
    }

    /// Forget the connection, unless it has already been replaced.
    fn drop_connection(&self, generation: u64) {
        let mut link = self.lock_link();
        if link
            .connection
            .as_ref()
            .is_some_and(|c| c.generation == generation)
        {
            if let Some(conn) = link.connection.take() {
                conn.shut();
            }
        }
    }

    fn lock_link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Raw I/O ───────────────────────────────────────────────────────────────

    /// Write every byte and flush.
    pub async fn write(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let conn = self.connection().await?;
        let mut writer = conn.writer.lock().await;
        let guard = WriteGuard {
            iface: self,
            generation: conn.generation,
            armed: true,
        };
        let result = async {
            writer.write_all(bytes).await?;
            writer.flush().await
        }
        .await;
        drop(writer);

        match result {
            Ok(()) => {
                guard.disarm();
                Ok(())
            }
            Err(source) => {
                tracing::warn!(interface = %self.name, error = %source, "write failed, closing link");
                drop(guard);
                Err(LinkError::Write {
                    endpoint: self.endpoint().to_string(),
                    source,
                })
            }
        }
    }

    /// Suspend until exactly `n` bytes have arrived.
    pub async fn read_exactly(&self, n: usize) -> Result<Vec<u8>, LinkError> {
        let conn = self.connection().await?;
        let mut inbound = conn.reader.lock().await;
        let result = inbound.fill(n).await;
        drop(inbound);

        result.map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotConnected {
                tracing::debug!(interface = %self.name, "link closed under a pending read");
                self.drop_connection(conn.generation);
                return LinkError::NotConnected {
                    endpoint: self.endpoint().to_string(),
                };
            }
            tracing::warn!(interface = %self.name, error = %source, "read failed, closing link");
            self.drop_connection(conn.generation);
            LinkError::Read {
                endpoint: self.endpoint().to_string(),
                source,
            }
        })
    }

    // ── Packets ───────────────────────────────────────────────────────────────

    /// Seal framed packets, then write the wire image.
    pub async fn send(&self, packet: &mut Packet) -> Result<(), LinkError> {
        if let PacketKind::Framed(_) = packet.kind() {
            validator::seal(packet)?;
        }
        self.write(&packet.to_bytes()).await?;
        tracing::trace!(interface = %self.name, task_id = packet.task_id(), "packet sent");
        Ok(())
    }

    /// Receive one frame of the given shape.
    ///
    /// The layout is checked before touching the link. `Ok(None)` means a
    /// frame arrived but was addressed elsewhere or failed validation.
    pub async fn try_receive(
        &self,
        kind: PacketKind,
        total_size: usize,
        task_id_width: TaskIdWidth,
    ) -> Result<Option<Packet>, LinkError> {
        let layout = Layout::new(&self.protocol, kind, total_size, task_id_width)?;
        self.receive(layout).await
    }

    /// Same as [`try_receive`](Self::try_receive) with a prebuilt layout.
    pub async fn receive(&self, layout: Layout) -> Result<Option<Packet>, LinkError> {
        let raw = self.read_exactly(layout.total_size()).await?;
        let packet = Packet::from_bytes(&raw, layout)?;

        let receiver = packet.header().receiver_id();
        if receiver != self.protocol.board_id() {
            tracing::trace!(interface = %self.name, receiver, "frame for another board, dropped");
            return Ok(None);
        }
        if !validator::is_valid(&packet) {
            tracing::debug!(interface = %self.name, task_id = packet.task_id(), "checksum mismatch, dropped");
            return Ok(None);
        }
        Ok(Some(packet))
    }
}

impl std::fmt::Debug for Interface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interface")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint())
            .field("state", &self.state())
            .finish()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
