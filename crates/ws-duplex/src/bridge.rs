//! Bridge driver between the open transport and the stream endpoints.
//!
//! A single spawned task owns the transport and funnels every termination
//! trigger (explicit close, sink finish, transport close/error, cancellation,
//! all handles dropped) through one close coordinator, so the close handshake
//! runs at most once and the shared outcome settles exactly once.

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::WsError;
use crate::message::{CloseFrame, Message};
use crate::transport::{Transport, TransportEvent};

/// Shared close outcome: `None` until settled, then write-once.
pub(crate) type Outcome = Option<Result<CloseFrame, WsError>>;

/// Commands accepted by the driver task.
pub(crate) enum Command {
    /// Relay one message; the ack resolves once the transport accepted it.
    Send(Message, oneshot::Sender<Result<(), WsError>>),
    /// Begin a graceful shutdown with the given code and reason.
    Close { code: u16, reason: String },
}

pub(crate) struct Bridge<T: Transport> {
    transport: T,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    inbound_tx: mpsc::UnboundedSender<Result<Message, WsError>>,
    outcome_tx: watch::Sender<Outcome>,
    cancel: CancellationToken,
}

impl<T: Transport> Bridge<T> {
    /// Install the bridge over an already-open transport and spawn the
    /// driver task.
    pub(crate) fn spawn(
        transport: T,
        cancel: CancellationToken,
    ) -> (
        mpsc::UnboundedSender<Command>,
        mpsc::UnboundedReceiver<Result<Message, WsError>>,
        watch::Receiver<Outcome>,
    ) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let bridge = Bridge {
            transport,
            cmd_rx,
            inbound_tx,
            outcome_tx,
            cancel,
        };
        tokio::spawn(bridge.run());
        (cmd_tx, inbound_rx, outcome_rx)
    }

    async fn run(mut self) {
        let outcome = self.active().await;
        self.settle(outcome);

        // Entering Closed: force both halves terminal. Dropping the inbound
        // sender ends the stream after any still-buffered messages; every
        // write left in the queue is answered without touching the transport.
        self.cmd_rx.close();
        let cause = self.write_failure_cause();
        while let Ok(cmd) = self.cmd_rx.try_recv() {
            if let Command::Send(_, ack) = cmd {
                let _ = ack.send(Err(cause.clone()));
            }
        }
    }

    /// Active phase: relay messages both ways until the first termination
    /// trigger, then drive the transport closed and report the outcome that
    /// trigger determined.
    async fn active(&mut self) -> Result<CloseFrame, WsError> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("cancellation fired; closing abruptly");
                    // The token doubles as the inbound discard signal; no
                    // drain here, an abrupt stop does not wait for the peer.
                    let _ = self.transport.close(CloseFrame::NORMAL_CODE, "").await;
                    return Err(WsError::Cancelled);
                }
                event = self.transport.next_event() => match event {
                    TransportEvent::Message(msg) => {
                        let _ = self.inbound_tx.send(Ok(msg));
                    }
                    TransportEvent::Closed { code, reason } => {
                        debug!(code, "transport closed");
                        return Ok(CloseFrame { code, reason });
                    }
                    TransportEvent::Error(e) => {
                        warn!(error = %e, "transport failure");
                        let failure = WsError::Transport(e);
                        // The failure is the inbound stream's last item.
                        let _ = self.inbound_tx.send(Err(failure.clone()));
                        return Err(failure);
                    }
                    // The handshake already consumed `Open`.
                    TransportEvent::Open { .. } => {}
                },
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(Command::Send(msg, ack)) => {
                        // One write in flight at a time; the queue holds the
                        // rest in submission order.
                        match self.transport.send(msg).await {
                            Ok(()) => {
                                let _ = ack.send(Ok(()));
                            }
                            Err(e) => {
                                warn!(error = %e, "send failed");
                                let failure = WsError::Transport(e);
                                let _ = ack.send(Err(failure.clone()));
                                let _ = self.inbound_tx.send(Err(failure.clone()));
                                return Err(failure);
                            }
                        }
                    }
                    Some(Command::Close { code, reason }) => {
                        debug!(code, "close requested");
                        let frame = CloseFrame { code, reason };
                        if self.transport.close(frame.code, &frame.reason).await.is_ok() {
                            self.closing().await;
                        }
                        return Ok(frame);
                    }
                    // Every handle dropped: graceful default close.
                    None => {
                        debug!("all handles dropped; closing");
                        let _ = self.transport.close(CloseFrame::NORMAL_CODE, "").await;
                        self.closing().await;
                        return Ok(CloseFrame::normal());
                    }
                },
            }
        }
    }

    /// Closing phase: the outcome is already decided, but buffered messages
    /// keep flowing until the transport confirms closure. Writes can no
    /// longer be attempted.
    async fn closing(&mut self) {
        let mut cmd_open = true;
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                event = self.transport.next_event() => match event {
                    TransportEvent::Message(msg) => {
                        let _ = self.inbound_tx.send(Ok(msg));
                    }
                    TransportEvent::Closed { .. } | TransportEvent::Error(_) => return,
                    TransportEvent::Open { .. } => {}
                },
                cmd = self.cmd_rx.recv(), if cmd_open => match cmd {
                    Some(Command::Send(_, ack)) => {
                        let _ = ack.send(Err(WsError::NotOpen));
                    }
                    // A second close request lost the race; consume it.
                    Some(Command::Close { .. }) => {}
                    None => cmd_open = false,
                },
            }
        }
    }

    /// First settlement wins; later attempts are no-ops.
    fn settle(&self, outcome: Result<CloseFrame, WsError>) {
        self.outcome_tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(outcome);
                true
            } else {
                false
            }
        });
    }

    /// The error every not-yet-attempted write reports once Closed: the
    /// transport failure that ended the connection, or not-open after a
    /// clean shutdown.
    fn write_failure_cause(&self) -> WsError {
        match &*self.outcome_tx.borrow() {
            Some(Err(e @ WsError::Transport(_))) => e.clone(),
            _ => WsError::NotOpen,
        }
    }
}
