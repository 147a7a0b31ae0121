use std::io;

use etask_core::LayoutError;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Caller asked for a layout that cannot exist. Raised before any I/O.
    #[error(transparent)]
    Layout(#[from] LayoutError),

    #[error("{endpoint}: connect failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("{endpoint}: write failed: {source}")]
    Write {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("{endpoint}: read failed: {source}")]
    Read {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    #[error("{endpoint}: close failed: {source}")]
    Close {
        endpoint: String,
        #[source]
        source: io::Error,
    },
    /// The link was closed underneath an operation that had already started.
    #[error("{endpoint}: link closed")]
    NotConnected { endpoint: String },

    #[error("hub needs at least one interface")]
    NoInterfaces,
    #[error("interface {0:?} is not managed by this hub")]
    UnknownInterface(String),
}

impl LinkError {
    /// True for I/O faults on a live link, false for configuration mistakes.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. }
                | Self::Write { .. }
                | Self::Read { .. }
                | Self::Close { .. }
                | Self::NotConnected { .. }
        )
    }
}
