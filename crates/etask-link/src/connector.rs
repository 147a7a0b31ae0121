//! Byte-stream connectors.
//!
//! A [`Connector`] knows how to produce a fresh duplex stream for one
//! endpoint. It holds no connection state itself; [`Interface`] owns the
//! live stream and decides when to reconnect.
//!
//! [`Interface`]: crate::Interface

use std::io;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// Anything we can split into independent read and write halves.
pub trait LinkStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> LinkStream for T {}

pub type BoxedStream = Box<dyn LinkStream>;

pub trait Connector: Send + Sync {
    /// Human-readable endpoint, used in errors and logs.
    fn endpoint(&self) -> &str;

    /// Establish a new stream.
    fn connect(&self) -> BoxFuture<'_, io::Result<BoxedStream>>;
}

// ── TCP ───────────────────────────────────────────────────────────────────────

/// TCP client endpoint. Nagle is disabled; packets are small and latency bound.
#[derive(Debug, Clone)]
pub struct TcpConnector {
    address: String,
    keepalive: bool,
}

impl TcpConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            keepalive: false,
        }
    }

    pub fn with_keepalive(mut self, keepalive: bool) -> Self {
        self.keepalive = keepalive;
        self
    }
}

impl Connector for TcpConnector {
    fn endpoint(&self) -> &str {
        &self.address
    }

    fn connect(&self) -> BoxFuture<'_, io::Result<BoxedStream>> {
        Box::pin(async move {
            let stream = TcpStream::connect(&self.address).await?;
            stream.set_nodelay(true)?;
            if self.keepalive {
                socket2::SockRef::from(&stream).set_keepalive(true)?;
            }
            tracing::debug!(address = %self.address, keepalive = self.keepalive, "tcp connected");
            Ok(Box::new(stream) as BoxedStream)
        })
    }
}

// ── Serial ────────────────────────────────────────────────────────────────────

#[cfg(feature = "serial")]
pub use serial::SerialConnector;

#[cfg(feature = "serial")]
mod serial {
    use super::*;
    use tokio_serial::SerialPortBuilderExt;

    /// Serial line at a fixed baud rate, 8N1.
    #[derive(Debug, Clone)]
    pub struct SerialConnector {
        path: String,
        baud: u32,
    }

    impl SerialConnector {
        pub fn new(path: impl Into<String>, baud: u32) -> Self {
            Self {
                path: path.into(),
                baud,
            }
        }
    }

    impl Connector for SerialConnector {
        fn endpoint(&self) -> &str {
            &self.path
        }

        fn connect(&self) -> BoxFuture<'_, io::Result<BoxedStream>> {
            Box::pin(async move {
                let port = tokio_serial::new(&self.path, self.baud)
                    .open_native_async()
                    .map_err(io::Error::from)?;
                tracing::debug!(path = %self.path, baud = self.baud, "serial port opened");
                Ok(Box::new(port) as BoxedStream)
            })
        }
    }
}
