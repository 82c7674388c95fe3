//! The adapter: stream endpoints over one open socket connection.
//!
//! [`WsDuplex::open`] drives the connection handshake and, on success,
//! installs the bridge driver over the open transport. The adapter exposes:
//!
//! - [`inbound`](WsDuplex::inbound) — a pull-driven [`Inbound`] stream of
//!   decoded messages.
//! - [`outbound`](WsDuplex::outbound) — a push-driven [`Outbound`] sink.
//! - [`closed`](WsDuplex::closed) — the shared close outcome, settled
//!   exactly once no matter how the connection ends.
//! - [`close`](WsDuplex::close) — a fire-and-forget graceful shutdown
//!   request.

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::bridge::{Bridge, Command, Outcome};
use crate::error::{TransportError, WsError};
use crate::inbound::Inbound;
use crate::message::CloseFrame;
use crate::outbound::Outbound;
use crate::transport::{Transport, TransportEvent};
use crate::ws::WsTransport;

/// Options for [`WsDuplex::open`].
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Sub-protocol candidates offered during the handshake.
    pub protocols: Vec<String>,
    /// External cancellation token. Firing it before the connection opens
    /// aborts the handshake; firing it afterwards closes the connection
    /// abruptly. No timeout is imposed internally — a caller wanting a
    /// connect deadline fires the token from a timer.
    pub cancel: Option<CancellationToken>,
}

/// Stream endpoints over an open socket connection.
pub struct WsDuplex {
    url: String,
    protocol: String,
    extensions: String,
    /// Pull half; see [`Inbound`].
    pub inbound: Inbound,
    /// Push half; see [`Outbound`].
    pub outbound: Outbound,
    cmd_tx: mpsc::UnboundedSender<Command>,
    outcome: watch::Receiver<Outcome>,
}

impl WsDuplex {
    /// Open a WebSocket connection and wrap it in stream endpoints.
    ///
    /// Suspends until the handshake completes, fails, or `options.cancel`
    /// fires — whichever happens first. Fails with
    /// [`WsError::Construction`], [`WsError::Connect`] or
    /// [`WsError::Cancelled`]; on success the adapter is fully wired, a
    /// partially open one is never observable.
    pub async fn open(url: &str, options: OpenOptions) -> Result<Self, WsError> {
        let transport = WsTransport::connect(url, &options.protocols)?;
        Self::from_transport(transport, url, options).await
    }

    /// Wrap any already-connecting [`Transport`] implementation.
    pub async fn from_transport<T: Transport>(
        mut transport: T,
        url: &str,
        options: OpenOptions,
    ) -> Result<Self, WsError> {
        let cancel = options.cancel.unwrap_or_default();

        let first = tokio::select! {
            biased;
            // Cancellation wins ties, and always wins if already fired.
            _ = cancel.cancelled() => {
                transport.abort();
                return Err(WsError::Cancelled);
            }
            event = transport.next_event() => event,
        };

        let (protocol, extensions) = match first {
            TransportEvent::Open {
                protocol,
                extensions,
            } => (protocol, extensions),
            TransportEvent::Error(e) => {
                // Relay the peer's close code before failing, so the
                // transport never lingers half-closed.
                if let Some((code, reason)) = e.close_info() {
                    let reason = reason.to_string();
                    let _ = transport.close(code, &reason).await;
                }
                return Err(WsError::Connect(e));
            }
            TransportEvent::Closed { code, reason } => {
                return Err(WsError::Connect(TransportError::Protocol {
                    message: "connection closed during handshake".to_string(),
                    close_code: Some(code),
                    reason,
                }));
            }
            TransportEvent::Message(_) => {
                return Err(WsError::Connect(TransportError::Protocol {
                    message: "message received before the handshake completed".to_string(),
                    close_code: None,
                    reason: String::new(),
                }));
            }
        };

        debug!(url, protocol = %protocol, "connection open");
        let (cmd_tx, inbound_rx, outcome) = Bridge::spawn(transport, cancel.clone());
        Ok(Self {
            url: url.to_string(),
            protocol,
            extensions,
            inbound: Inbound::new(inbound_rx, cancel),
            outbound: Outbound::new(cmd_tx.clone(), outcome.clone()),
            cmd_tx,
            outcome,
        })
    }

    /// Endpoint this adapter was opened against.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sub-protocol negotiated during the handshake (empty if none).
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Extensions negotiated during the handshake (empty if none).
    pub fn extensions(&self) -> &str {
        &self.extensions
    }

    /// Request a graceful shutdown and return immediately.
    ///
    /// The close handshake runs in the background; await
    /// [`closed`](WsDuplex::closed) to observe the final outcome. A no-op if
    /// the connection is already closing or closed.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.cmd_tx.send(Command::Close {
            code,
            reason: reason.to_string(),
        });
    }

    /// Graceful shutdown with the protocol's normal-closure defaults
    /// (code 1000, empty reason).
    pub fn close_default(&self) {
        self.close(CloseFrame::NORMAL_CODE, "");
    }

    /// Await the shared close outcome.
    ///
    /// Settles exactly once; every observer sees the same settlement.
    pub async fn closed(&self) -> Result<CloseFrame, WsError> {
        wait_outcome(self.outcome.clone()).await
    }

    /// Split into the two stream halves plus a close-outcome handle, so each
    /// can move to its own task.
    pub fn split(self) -> (Inbound, Outbound, Closed) {
        (
            self.inbound,
            self.outbound,
            Closed {
                outcome: self.outcome,
            },
        )
    }
}

/// Handle on the shared close outcome, obtained from [`WsDuplex::split`].
pub struct Closed {
    outcome: watch::Receiver<Outcome>,
}

impl Closed {
    /// Await the shared close outcome, as [`WsDuplex::closed`].
    pub async fn wait(self) -> Result<CloseFrame, WsError> {
        wait_outcome(self.outcome).await
    }
}

async fn wait_outcome(mut rx: watch::Receiver<Outcome>) -> Result<CloseFrame, WsError> {
    match rx.wait_for(|outcome| outcome.is_some()).await {
        Ok(outcome) => outcome.clone().unwrap_or(Err(WsError::NotOpen)),
        // The driver settles before exiting; a dropped sender without a
        // settlement means the runtime tore it down mid-flight.
        Err(_) => Err(WsError::Transport(TransportError::ConnectionClosed)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::message::Message;
    use crate::mock::{MockHandle, MockTransport};

    async fn open_mock() -> (WsDuplex, MockHandle) {
        let (transport, handle) = MockTransport::new();
        handle.open("chat", "permessage-deflate");
        let duplex = WsDuplex::from_transport(transport, "ws://example/test", OpenOptions::default())
            .await
            .unwrap();
        (duplex, handle)
    }

    #[tokio::test]
    async fn open_exposes_negotiated_properties() {
        let (duplex, _handle) = open_mock().await;
        assert_eq!(duplex.url(), "ws://example/test");
        assert_eq!(duplex.protocol(), "chat");
        assert_eq!(duplex.extensions(), "permessage-deflate");
    }

    #[tokio::test]
    async fn cancellation_before_open_never_yields_an_adapter() {
        let (transport, handle) = MockTransport::new();
        // The open event is ready too; cancellation must still win.
        handle.open("", "");
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = WsDuplex::from_transport(
            transport,
            "ws://example/test",
            OpenOptions {
                cancel: Some(cancel),
                ..OpenOptions::default()
            },
        )
        .await;
        assert!(matches!(result, Err(WsError::Cancelled)));
        assert!(handle.was_aborted());
    }

    #[tokio::test]
    async fn connect_error_with_close_info_relays_the_close() {
        let (transport, mut handle) = MockTransport::new();
        handle.push(TransportEvent::Error(TransportError::Protocol {
            message: "rejected".to_string(),
            close_code: Some(4000),
            reason: "denied".to_string(),
        }));

        let result =
            WsDuplex::from_transport(transport, "ws://example/test", OpenOptions::default()).await;
        assert!(matches!(result, Err(WsError::Connect(_))));
        assert_eq!(handle.closes.try_recv().ok(), Some((4000, "denied".to_string())));
    }

    #[tokio::test]
    async fn connect_error_without_close_info_propagates_as_is() {
        let (transport, mut handle) = MockTransport::new();
        handle.push(TransportEvent::Error(TransportError::Io(
            "refused".to_string(),
        )));

        let result =
            WsDuplex::from_transport(transport, "ws://example/test", OpenOptions::default()).await;
        assert!(
            matches!(result, Err(WsError::Connect(TransportError::Io(ref m))) if m == "refused")
        );
        assert!(handle.closes.try_recv().is_err());
    }

    #[tokio::test]
    async fn messages_sent_before_any_pull_drain_in_order_then_close() {
        let (mut duplex, handle) = open_mock().await;
        handle.push(TransportEvent::Message(Message::text("a")));
        handle.push(TransportEvent::Message(Message::text("b")));
        handle.push(TransportEvent::Closed {
            code: 1001,
            reason: "bye".to_string(),
        });

        assert_eq!(duplex.inbound.recv().await, Some(Ok(Message::text("a"))));
        assert_eq!(duplex.inbound.recv().await, Some(Ok(Message::text("b"))));
        assert_eq!(duplex.inbound.recv().await, None);
        assert_eq!(duplex.closed().await, Ok(CloseFrame::new(1001, "bye")));
    }

    #[tokio::test]
    async fn explicit_close_settles_with_the_requested_frame() {
        let (duplex, _handle) = open_mock().await;
        duplex.close(4001, "done here");
        assert_eq!(duplex.closed().await, Ok(CloseFrame::new(4001, "done here")));
    }

    #[tokio::test]
    async fn close_defaults_to_normal_closure() {
        let (duplex, mut handle) = open_mock().await;
        duplex.close_default();
        assert_eq!(duplex.closed().await, Ok(CloseFrame::normal()));
        assert_eq!(
            handle.closes.recv().await,
            Some((CloseFrame::NORMAL_CODE, String::new()))
        );
    }

    #[tokio::test]
    async fn first_close_trigger_wins() {
        let (duplex, _handle) = open_mock().await;
        duplex.close(4001, "first");
        duplex.close(4002, "second");
        assert_eq!(duplex.closed().await, Ok(CloseFrame::new(4001, "first")));
        // Later observers see the same settlement.
        assert_eq!(duplex.closed().await, Ok(CloseFrame::new(4001, "first")));
    }

    #[tokio::test]
    async fn writes_reach_the_transport_in_order() {
        let (mut duplex, mut handle) = open_mock().await;
        duplex.outbound.send("x").await.unwrap();
        duplex.outbound.send("y").await.unwrap();
        assert_eq!(handle.sent.recv().await, Some(Message::text("x")));
        assert_eq!(handle.sent.recv().await, Some(Message::text("y")));
    }

    #[tokio::test]
    async fn write_after_close_fails_without_blocking() {
        let (mut duplex, _handle) = open_mock().await;
        duplex.close_default();
        duplex.closed().await.unwrap();
        assert_eq!(duplex.outbound.send("x").await, Err(WsError::NotOpen));
    }

    #[tokio::test]
    async fn send_failure_terminates_both_halves() {
        let (mut duplex, handle) = open_mock().await;
        handle.fail_sends(TransportError::Io("broken pipe".to_string()));
        let failure = WsError::Transport(TransportError::Io("broken pipe".to_string()));

        assert_eq!(duplex.outbound.send("x").await, Err(failure.clone()));
        // Later writes fail fast with the same cause, untransmitted.
        assert_eq!(duplex.outbound.send("y").await, Err(failure.clone()));
        // The inbound stream ends with the same failure.
        assert_eq!(duplex.inbound.recv().await, Some(Err(failure.clone())));
        assert_eq!(duplex.inbound.recv().await, None);
        // And so does the shared outcome.
        assert_eq!(duplex.closed().await, Err(failure));
    }

    #[tokio::test]
    async fn transport_error_surfaces_on_the_next_pull() {
        let (mut duplex, handle) = open_mock().await;
        handle.push(TransportEvent::Error(TransportError::ConnectionClosed));

        assert_eq!(
            duplex.inbound.recv().await,
            Some(Err(WsError::Transport(TransportError::ConnectionClosed)))
        );
        assert_eq!(duplex.inbound.recv().await, None);
        assert_eq!(
            duplex.closed().await,
            Err(WsError::Transport(TransportError::ConnectionClosed))
        );
    }

    #[tokio::test]
    async fn cancellation_after_open_stops_everything() {
        let cancel = CancellationToken::new();
        let (transport, handle) = MockTransport::new();
        handle.open("", "");
        let mut duplex = WsDuplex::from_transport(
            transport,
            "ws://example/test",
            OpenOptions {
                cancel: Some(cancel.clone()),
                ..OpenOptions::default()
            },
        )
        .await
        .unwrap();

        handle.push(TransportEvent::Message(Message::text("unread")));
        cancel.cancel();

        assert_eq!(duplex.closed().await, Err(WsError::Cancelled));
        // Buffered messages are discarded, the stream just ends.
        assert_eq!(duplex.inbound.recv().await, None);
    }

    #[tokio::test]
    async fn finish_on_the_sink_closes_gracefully() {
        let (mut duplex, mut handle) = open_mock().await;
        duplex.outbound.send("last").await.unwrap();
        duplex.outbound.finish().await.unwrap();

        assert_eq!(handle.sent.recv().await, Some(Message::text("last")));
        assert_eq!(duplex.closed().await, Ok(CloseFrame::normal()));
        assert_eq!(
            handle.closes.recv().await,
            Some((CloseFrame::NORMAL_CODE, String::new()))
        );
    }

    #[tokio::test]
    async fn dropping_every_handle_closes_gracefully() {
        let (duplex, mut handle) = open_mock().await;
        let (inbound, outbound, closed) = duplex.split();
        drop(inbound);
        drop(outbound);

        assert_eq!(closed.wait().await, Ok(CloseFrame::normal()));
        assert_eq!(
            handle.closes.recv().await,
            Some((CloseFrame::NORMAL_CODE, String::new()))
        );
    }
}
