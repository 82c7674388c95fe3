//! Error taxonomy for the adapter.
//!
//! Errors are cloneable on purpose: a single transport failure is surfaced
//! to the in-flight write, to the inbound stream, and to the shared close
//! outcome, so the same value travels to several observers.

use thiserror::Error;

/// Transport-level failure reported by a [`Transport`](crate::transport::Transport)
/// implementation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection is closed (or was never usable for the operation).
    #[error("connection closed")]
    ConnectionClosed,

    /// A protocol-level failure. Connect-time failures may carry the close
    /// code/reason the peer supplied, for the handshake to relay.
    #[error("{message}")]
    Protocol {
        message: String,
        close_code: Option<u16>,
        reason: String,
    },

    /// An I/O error.
    #[error("{0}")]
    Io(String),
}

impl TransportError {
    /// Close code and reason attached to this error, if any.
    pub fn close_info(&self) -> Option<(u16, &str)> {
        match self {
            Self::Protocol {
                close_code: Some(code),
                reason,
                ..
            } => Some((*code, reason.as_str())),
            _ => None,
        }
    }
}

/// Adapter-level errors surfaced by `open`, pulls, writes and the close
/// outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WsError {
    /// The endpoint or options were invalid at construction time.
    #[error("invalid endpoint: {0}")]
    Construction(String),

    /// The transport failed during the connection handshake.
    #[error("handshake failed: {0}")]
    Connect(TransportError),

    /// The external cancellation token fired.
    #[error("cancelled")]
    Cancelled,

    /// A write was attempted while the connection is not open.
    #[error("connection is not open")]
    NotOpen,

    /// The transport failed after the connection was open.
    #[error("transport failure: {0}")]
    Transport(TransportError),
}
