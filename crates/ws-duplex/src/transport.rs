//! Transport abstraction for the underlying socket connection.
//!
//! Decouples the adapter from any specific socket implementation. The
//! bundled [`WsTransport`](crate::ws::WsTransport) implements this over
//! `tokio-tungstenite`; tests drive the adapter with a scripted mock.

use std::future::Future;

use crate::error::TransportError;
use crate::message::Message;

/// A notification emitted by the underlying socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection handshake completed. Carries the negotiated
    /// sub-protocol and extensions (empty strings if none).
    Open { protocol: String, extensions: String },
    /// A decoded message arrived.
    Message(Message),
    /// The connection closed, with the peer's close code and reason.
    Closed { code: u16, reason: String },
    /// The connection failed.
    Error(TransportError),
}

/// An event-driven, full-duplex socket connection.
///
/// Connect-on-construction: a freshly constructed transport is already
/// connecting, and its first event is either `Open` or `Error`. After
/// `Closed` or `Error` the transport keeps reporting `Closed`.
pub trait Transport: Send + 'static {
    /// Receive the next notification from the socket.
    fn next_event(&mut self) -> impl Future<Output = TransportEvent> + Send;

    /// Send one message to the peer.
    fn send(&mut self, msg: Message) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Initiate the close handshake. The eventual `Closed` event from
    /// [`next_event`](Transport::next_event) confirms closure.
    fn close(
        &mut self,
        code: u16,
        reason: &str,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Drop a pending connection attempt, if the transport supports that.
    ///
    /// Called when cancellation fires before the connection opened.
    fn abort(&mut self) {}
}
