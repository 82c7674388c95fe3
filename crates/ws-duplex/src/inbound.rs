//! Pull-driven inbound half: a lazy stream of decoded messages.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::WsError;
use crate::message::Message;

/// The inbound half of an open adapter.
///
/// Messages arriving while no pull is outstanding accumulate in an internal
/// queue — the socket cannot be paused mid-stream, so this is bounded-effort
/// buffering rather than true flow control toward the peer. Nothing is
/// dropped while the connection is open; on close the queue drains to the
/// consumer before the stream ends.
pub struct Inbound {
    rx: mpsc::UnboundedReceiver<Result<Message, WsError>>,
    cancel: CancellationToken,
    done: bool,
}

impl Inbound {
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<Result<Message, WsError>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rx,
            cancel,
            done: false,
        }
    }

    /// Receive the next message.
    ///
    /// `None` means the connection ended cleanly (or was cancelled); an
    /// `Err` item reports the transport failure that ended the stream.
    pub async fn recv(&mut self) -> Option<Result<Message, WsError>> {
        self.next().await
    }
}

impl Stream for Inbound {
    type Item = Result<Message, WsError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        // Cancellation is an abrupt stop: finish immediately, discarding
        // anything still buffered.
        if self.cancel.is_cancelled() {
            self.done = true;
            self.rx.close();
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(item)) => {
                if item.is_err() {
                    // A failure is the last item; the stream ends after it.
                    self.done = true;
                }
                Poll::Ready(Some(item))
            }
            Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
