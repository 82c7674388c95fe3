//! Push-driven outbound half: an ordered sink of messages.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use futures_util::{Sink, SinkExt};
use tokio::sync::{mpsc, oneshot, watch};

use crate::bridge::{Command, Outcome};
use crate::error::WsError;
use crate::message::{CloseFrame, Message};

/// The outbound half of an open adapter.
///
/// Writes reach the transport in submission order, one in flight at a time;
/// a write is acknowledged only once the transport accepted it. After a
/// failed write the sink is failed: every later write reports the same cause
/// without touching the transport.
pub struct Outbound {
    cmd_tx: mpsc::UnboundedSender<Command>,
    outcome: watch::Receiver<Outcome>,
    pending: Option<oneshot::Receiver<Result<(), WsError>>>,
    failed: Option<WsError>,
    finished: bool,
}

impl Outbound {
    pub(crate) fn new(
        cmd_tx: mpsc::UnboundedSender<Command>,
        outcome: watch::Receiver<Outcome>,
    ) -> Self {
        Self {
            cmd_tx,
            outcome,
            pending: None,
            failed: None,
            finished: false,
        }
    }

    /// Send one message, resolving once the transport accepted it.
    pub async fn send(&mut self, msg: impl Into<Message>) -> Result<(), WsError> {
        SinkExt::send(self, msg.into()).await
    }

    /// Finish writing: waits for the in-flight write, then asks the close
    /// coordinator for a graceful shutdown. The transport itself is closed
    /// by the coordinator, never from here.
    pub async fn finish(&mut self) -> Result<(), WsError> {
        SinkExt::close(self).await
    }

    /// What a write should report once the connection is gone: the settled
    /// transport failure if there is one, not-open otherwise.
    fn closed_cause(&self) -> WsError {
        match &*self.outcome.borrow() {
            Some(Err(e @ WsError::Transport(_))) => e.clone(),
            _ => WsError::NotOpen,
        }
    }

    fn poll_pending(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        let Some(ack) = self.pending.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        let result = ready!(Pin::new(ack).poll(cx));
        self.pending = None;
        // A dropped ack means the driver tore down mid-write.
        let result = match result {
            Ok(result) => result,
            Err(_) => Err(self.closed_cause()),
        };
        if let Err(e) = &result {
            self.failed = Some(e.clone());
        }
        Poll::Ready(result)
    }
}

impl Sink<Message> for Outbound {
    type Error = WsError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        if let Some(e) = &self.failed {
            return Poll::Ready(Err(e.clone()));
        }
        self.poll_pending(cx)
    }

    fn start_send(mut self: Pin<&mut Self>, msg: Message) -> Result<(), WsError> {
        if let Some(e) = &self.failed {
            return Err(e.clone());
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Send(msg, ack_tx)).is_err() {
            let cause = self.closed_cause();
            self.failed = Some(cause.clone());
            return Err(cause);
        }
        self.pending = Some(ack_rx);
        Ok(())
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        if let Some(e) = &self.failed {
            return Poll::Ready(Err(e.clone()));
        }
        self.poll_pending(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
        ready!(self.as_mut().poll_flush(cx))?;
        if !self.finished {
            self.finished = true;
            let _ = self.cmd_tx.send(Command::Close {
                code: CloseFrame::NORMAL_CODE,
                reason: String::new(),
            });
        }
        Poll::Ready(Ok(()))
    }
}
